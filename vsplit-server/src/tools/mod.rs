//! External tool adapters
//!
//! The pipeline only sees the two capability traits below. Command-line
//! implementations live in [`ffmpeg`] and [`separator`]; tests substitute
//! in-process stubs.

pub mod command;
pub mod ffmpeg;
pub mod separator;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use ffmpeg::FfmpegExtractor;
pub use separator::CommandSeparator;

/// Canonical waveform sample rate
pub const CANONICAL_SAMPLE_RATE: u32 = 44_100;

/// Canonical waveform channel count
pub const CANONICAL_CHANNELS: u16 = 2;

/// Canonical waveform bit depth (signed PCM)
pub const CANONICAL_BITS_PER_SAMPLE: u16 = 16;

/// Waveform extraction failed
///
/// `reason` is internal detail (may quote tool output) and must not be
/// shown to clients.
#[derive(Debug, Clone, Error)]
#[error("audio extraction failed: {reason}")]
pub struct ExtractionFailed {
    pub reason: String,
}

impl ExtractionFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Stem separation failed
#[derive(Debug, Clone, Error)]
#[error("audio separation failed: {reason}")]
pub struct SeparationFailed {
    pub reason: String,
}

impl SeparationFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn outputs_not_found() -> Self {
        Self::new("outputs not found")
    }
}

/// Located separator outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemPaths {
    pub vocals: PathBuf,
    pub background: PathBuf,
}

/// Converts arbitrary input media into the canonical PCM waveform
/// (16-bit signed, 44.1 kHz, stereo)
///
/// Writes exactly one file at `output` on success and leaves nothing
/// behind on failure.
#[async_trait]
pub trait WaveformExtractor: Send + Sync {
    async fn extract(&self, input: &Path, output: &Path) -> Result<(), ExtractionFailed>;
}

/// Splits a waveform into a vocal stem and a background stem
///
/// Output layout below `output_dir` is backend-specific; implementations
/// locate their results by search.
#[async_trait]
pub trait StemSeparator: Send + Sync {
    async fn separate(&self, waveform: &Path, output_dir: &Path)
        -> Result<StemPaths, SeparationFailed>;
}
