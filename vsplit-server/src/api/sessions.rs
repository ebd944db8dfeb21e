//! GET /clean-session/{session_id}
//!
//! Explicit reclamation of a finished session. Idempotent: a second call
//! for the same id reports "not found".

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::arena::DestroyOutcome;
use crate::error::{ApiError, ApiResult};
use crate::session::SessionId;
use crate::AppState;

/// Clean-session response
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CleanSessionResponse {
    /// "success" or "not found"
    pub status: String,
    pub message: String,
}

impl CleanSessionResponse {
    fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: "Session files cleaned up.".to_string(),
        }
    }

    fn not_found(message: &str) -> Self {
        Self {
            status: "not found".to_string(),
            message: message.to_string(),
        }
    }
}

/// GET /clean-session/{session_id}
///
/// Sessions still owned by a running pipeline are left alone; the
/// pipeline cleans up after itself if it fails.
pub async fn clean_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CleanSessionResponse>> {
    let Ok(session_id) = session_id.parse::<SessionId>() else {
        return Ok(Json(CleanSessionResponse::not_found("Session not found.")));
    };

    if state.active().contains(&session_id) {
        tracing::info!(session_id = %session_id, "Clean requested for in-flight session, ignoring");
        return Ok(Json(CleanSessionResponse::not_found(
            "Session is still processing.",
        )));
    }

    let arena = state.arena().clone();
    let outcome = tokio::task::spawn_blocking(move || arena.destroy(&session_id))
        .await
        .map_err(|e| ApiError::Internal(format!("cleanup task failed: {}", e)))?;

    let response = match outcome {
        DestroyOutcome::Removed | DestroyOutcome::Partial { .. } => {
            tracing::info!(session_id = %session_id, ?outcome, "Session reclaimed on request");
            CleanSessionResponse::success()
        }
        DestroyOutcome::NotFound => CleanSessionResponse::not_found("Session not found."),
    };

    Ok(Json(response))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new().route("/clean-session/:session_id", get(clean_session))
}
