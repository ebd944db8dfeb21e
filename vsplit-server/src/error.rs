//! Error types for vsplit-server HTTP handlers
//!
//! Client-facing bodies follow `{"detail": "..."}`. Pipeline failures map to
//! a fixed message per stage; internal causes are logged, never echoed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::PipelineError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Processing failed (500)
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Standard 404 for artifact lookups
    pub fn file_not_found() -> Self {
        ApiError::NotFound("File not found.".to_string())
    }
}

/// Safe message for a pipeline failure
fn pipeline_message(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::Allocation(_) => "Could not create a processing session.",
        PipelineError::Upload(_) => "Upload failed.",
        PipelineError::Extraction(_) => "Audio extraction/transcoding failed.",
        PipelineError::Separation(_) => "Audio separation failed.",
        PipelineError::State(_) => "Processing failed.",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Pipeline(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                pipeline_message(err).to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error.".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
