//! GET /healthz and GET /
//!
//! Health reports "degraded" when the arena root has gone missing, since
//! no new session could be allocated.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Short commit hash captured at build time
    pub build: &'static str,
    pub uptime_seconds: u64,
    /// Pipelines currently running
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub message: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    let root = state.arena().root().to_path_buf();
    let root_ok = tokio::fs::metadata(&root)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !root_ok {
        tracing::warn!(root = %root.display(), "Arena root unavailable");
    }

    Json(HealthResponse {
        status: if root_ok { "ok" } else { "degraded" },
        module: "vsplit-server",
        version: env!("CARGO_PKG_VERSION"),
        build: env!("GIT_HASH"),
        uptime_seconds,
        active_sessions: state.active().len(),
    })
}

pub async fn root() -> Json<InfoResponse> {
    Json(InfoResponse {
        message: "vsplit media separation API is running!",
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(health_check))
}
