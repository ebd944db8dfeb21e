//! Artifact streaming
//!
//! GET /serve-file/{session_id}/{filename}: inline playback (range aware)
//! GET /download-file/{session_id}/{filename}: forced download as audio/wav
//!
//! A file removed by reclamation mid-stream ends the body with an I/O
//! error; the connection is dropped, nothing else is affected.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{ApiError, ApiResult};
use crate::session::SessionId;
use crate::AppState;

/// MIME type for downloads
pub const DOWNLOAD_CONTENT_TYPE: &str = "audio/wav";

async fn resolve(state: &AppState, session_id: &str, filename: &str) -> ApiResult<PathBuf> {
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| ApiError::file_not_found())?;
    state
        .locator
        .resolve_blocking(session_id, filename.to_string())
        .await
        .map_err(|_| ApiError::file_not_found())
}

/// Quote-safe value for Content-Disposition
fn attachment_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// GET /serve-file/{session_id}/{filename}
pub async fn serve_file(
    State(state): State<AppState>,
    Path((session_id, filename)): Path<(String, String)>,
    request: Request,
) -> ApiResult<Response> {
    let path = resolve(&state, &session_id, &filename).await?;

    let response = ServeFile::new(path)
        .oneshot(request)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if response.status() == StatusCode::NOT_FOUND {
        // Reclaimed between lookup and open
        return Err(ApiError::file_not_found());
    }

    Ok(response.into_response())
}

/// GET /download-file/{session_id}/{filename}
pub async fn download_file(
    State(state): State<AppState>,
    Path((session_id, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let path = resolve(&state, &session_id, &filename).await?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::file_not_found())?;
    let length = file.metadata().await.ok().map(|m| m.len());

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(DOWNLOAD_CONTENT_TYPE),
    );
    headers.insert(header::CONTENT_DISPOSITION, attachment_disposition(&filename));
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

/// Build file routes
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/serve-file/:session_id/:filename", get(serve_file))
        .route("/download-file/:session_id/:filename", get(download_file))
}
