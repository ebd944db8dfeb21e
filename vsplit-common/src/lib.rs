//! # vsplit Common Library
//!
//! Shared code for the vsplit workspace:
//! - Error type used during bootstrap
//! - TOML bootstrap configuration and config file discovery
//! - Human-readable duration parsing for config values

pub mod config;
pub mod duration;
pub mod error;

pub use error::{Error, Result};
