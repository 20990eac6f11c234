use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// GET / (liveness)
pub async fn root() -> Json<Value> {
    Json(json!({ "msg": "VipChakra ML service running" }))
}

/// GET /ready
///
/// Always 200; unavailable models are reported in the body.
pub async fn readiness(State(state): State<Arc<AppState>>) -> Json<Value> {
    let entries: usize = state.gallery.values().sum();
    let embedding_dimension = state.reuse.embedder().get().map(|e| e.dimension());
    Json(json!({
        "status": if state.is_ready() { "ready" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "models": {
            "embedder": state.reuse.embedder().status(),
            "detector": state.analyzer.detector().status(),
            "recognizer": state.analyzer.matcher().status(),
        },
        "embedding_dimension": embedding_dimension,
        "gallery": {
            "identities": state.gallery.len(),
            "entries": entries,
        },
    }))
}

/// GET /gallery
pub async fn gallery(State(state): State<Arc<AppState>>) -> Json<Value> {
    let identities: Vec<Value> = state
        .gallery
        .iter()
        .map(|(name, entries)| json!({ "name": name, "entries": entries }))
        .collect();
    Json(json!({ "identities": identities }))
}
