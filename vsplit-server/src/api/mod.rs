//! HTTP API handlers for vsplit-server

pub mod files;
pub mod health;
pub mod sessions;
pub mod upload;

pub use files::file_routes;
pub use health::health_routes;
pub use sessions::session_routes;
pub use upload::upload_routes;
