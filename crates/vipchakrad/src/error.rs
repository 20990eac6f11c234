use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use vipchakra_core::{AnalyzeError, ReuseError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to HTTP clients as `{"detail": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid multipart upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Reuse(#[from] ReuseError),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Analyze(AnalyzeError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            ApiError::Reuse(_) | ApiError::Analyze(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("inference task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vipchakra_core::embedder::EmbedderError;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Analyze(AnalyzeError::InvalidImage("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Reuse(ReuseError::ModelUnavailable("missing".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Reuse(ReuseError::Embedding(EmbedderError::Tokenizer("oops".into()))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_detail_message() {
        let err = ApiError::Reuse(ReuseError::ModelUnavailable("no onnx".into()));
        assert_eq!(err.to_string(), "sentence embedding model is not loaded: no onnx");
    }
}
