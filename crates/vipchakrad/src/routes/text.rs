use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRequest {
    pub text: String,
    /// Embeddings of the caller's previous content.
    #[serde(default)]
    pub existing_embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResponse {
    pub is_reused_content: bool,
    pub new_embedding: Vec<f32>,
}

/// POST /analyze/text
pub async fn analyze_text(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<TextResponse>> {
    let chars = request.text.chars().count();
    let history = request.existing_embeddings.len();

    let result = tokio::task::spawn_blocking(move || {
        state.reuse.check(&request.text, &request.existing_embeddings)
    })
    .await??;

    tracing::info!(chars, history, is_reused = result.is_reused, "text analyzed");

    Ok(Json(TextResponse {
        is_reused_content: result.is_reused,
        new_embedding: result.embedding.values,
    }))
}
