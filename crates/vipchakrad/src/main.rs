use anyhow::Result;
use tracing_subscriber::EnvFilter;
use vipchakrad::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vipchakrad starting");

    vipchakrad::serve(Config::from_env()).await
}
