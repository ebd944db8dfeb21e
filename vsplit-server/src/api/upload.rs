//! POST /upload-media/
//!
//! Streams the uploaded file straight into a new session and runs the
//! pipeline before responding.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use futures::TryStreamExt;
use serde::Serialize;
use std::io;
use tokio_util::io::StreamReader;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::ProcessedSession;
use crate::AppState;

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub vocals_url: String,
    pub background_url: String,
    pub vocals_download_url: String,
    pub background_download_url: String,
    pub session_id: String,
}

impl From<&ProcessedSession> for UploadResponse {
    fn from(processed: &ProcessedSession) -> Self {
        Self {
            status: "success".to_string(),
            vocals_url: processed.vocals.serve_url(),
            background_url: processed.background.serve_url(),
            vocals_download_url: processed.vocals.download_url(),
            background_download_url: processed.background.download_url(),
            session_id: processed.session_id.to_string(),
        }
    }
}

/// POST /upload-media/
///
/// Uses the first multipart field that carries a file name, or the field
/// named `file`. Other fields are ignored.
pub async fn upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?;

        let Some(field) = field else {
            return Err(ApiError::BadRequest("No file uploaded.".to_string()));
        };

        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        tracing::info!(filename = ?original_name, "Upload received");

        // A dropped connection surfaces as a read error here
        let stream = field.map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let reader = StreamReader::new(Box::pin(stream));

        let processed = state
            .pipeline
            .process(original_name.as_deref(), reader)
            .await?;

        return Ok(Json(UploadResponse::from(&processed)));
    }
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload-media/", post(upload_media))
}
