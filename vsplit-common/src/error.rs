//! Startup error type for the vsplit crates
//!
//! Only configuration loading and validation produce these; request-time
//! failures have their own types in the server crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Config file unreadable, malformed, or internally inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// Duration value such as `30m` that does not parse
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}
