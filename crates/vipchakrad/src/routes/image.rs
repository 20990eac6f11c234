use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use std::sync::Arc;
use vipchakra_core::ImageAnalysisResult;

const UPLOAD_FIELD: &str = "file";

/// POST /analyze/image
pub async fn analyze_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImageAnalysisResult>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| ApiError::BadRequest(format!("missing multipart field `{UPLOAD_FIELD}`")))?;
    let size = bytes.len();

    let result = tokio::task::spawn_blocking(move || state.analyzer.analyze(&bytes)).await??;

    tracing::info!(bytes = size, faces = result.faces.len(), phash = %result.phash, "image analyzed");
    Ok(Json(result))
}
