//! vsplit-server library interface
//!
//! Session-scoped vocal/background separation: each upload gets its own
//! working directory, runs through extraction and separation, and is
//! reclaimed on request or after it goes stale.

pub mod api;
pub mod arena;
pub mod config;
pub mod error;
pub mod locator;
pub mod logging;
pub mod pipeline;
pub mod reclaim;
pub mod session;
pub mod tools;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::arena::{ActiveSessions, SessionArena};
use crate::locator::ArtifactLocator;
use crate::pipeline::SessionPipeline;

/// Multipart framing allowance on top of the file size cap
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Upload processing
    pub pipeline: SessionPipeline,
    /// Serve-time artifact lookup
    pub locator: ArtifactLocator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Request body cap for uploads
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(pipeline: SessionPipeline, max_upload_bytes: u64) -> Self {
        let locator = ArtifactLocator::new(pipeline.arena().clone());
        Self {
            pipeline: pipeline.with_max_upload_bytes(max_upload_bytes),
            locator,
            startup_time: Utc::now(),
            max_upload_bytes,
        }
    }

    pub fn arena(&self) -> &SessionArena {
        self.pipeline.arena()
    }

    pub fn active(&self) -> &ActiveSessions {
        self.pipeline.active()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
        .try_into()
        .unwrap_or(usize::MAX);

    Router::new()
        .merge(api::upload_routes().layer(DefaultBodyLimit::max(body_limit)))
        .merge(api::file_routes())
        .merge(api::session_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
