//! Router and HTTP server lifecycle.

use crate::config::Config;
use crate::routes;
use crate::state::AppState;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the router. Analysis routes also answer with a trailing slash.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes();
    let timeout = state.config.request_timeout();

    let analysis = Router::new()
        .route("/analyze/text", post(routes::analyze_text))
        .route("/analyze/text/", post(routes::analyze_text))
        .route("/analyze/image", post(routes::analyze_image))
        .route("/analyze/image/", post(routes::analyze_image))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/", get(routes::root))
        .route("/ready", get(routes::readiness))
        .route("/gallery", get(routes::gallery))
        .merge(analysis)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load models and serve until SIGTERM or Ctrl+C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.bind_addr))?;

    tracing::info!(
        model_dir = %config.model_dir.display(),
        gallery_dir = %config.gallery_dir.display(),
        "loading models"
    );
    let state = tokio::task::spawn_blocking(move || AppState::load(config))
        .await
        .context("model loading panicked")?;
    if !state.is_ready() {
        tracing::warn!("starting with some models unavailable, see GET /ready");
    }

    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "vipchakrad listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("vipchakrad shut down");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
