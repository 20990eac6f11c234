pub mod health;
pub mod image;
pub mod text;

pub use health::{gallery, readiness, root};
pub use image::analyze_image;
pub use text::{analyze_text, TextRequest, TextResponse};
