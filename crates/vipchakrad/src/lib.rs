//! vipchakrad — HTTP front end for the VipChakra inference pipelines.
//!
//! Models are loaded once at startup into [`AppState`]; handlers run the
//! blocking inference on Tokio's blocking pool.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use server::{build_router, serve};
pub use state::AppState;
