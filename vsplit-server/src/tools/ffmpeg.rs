//! ffmpeg-based waveform extraction
//!
//! Handles both video containers (audio track extracted, video dropped)
//! and compressed audio (transcoded) with the same invocation.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::command::{run_bounded, CommandError};
use super::{
    ExtractionFailed, WaveformExtractor, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE,
};

/// Runs an ffmpeg-compatible executable
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-vn".into(),
            "-acodec".into(),
            "pcm_s16le".into(),
            "-ar".into(),
            CANONICAL_SAMPLE_RATE.to_string().into(),
            "-ac".into(),
            CANONICAL_CHANNELS.to_string().into(),
            output.into(),
        ]
    }
}

/// Sibling path the tool writes to before the result is renamed into place
///
/// Keeps the `.wav` extension so the tool infers the right container.
pub(crate) fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}.partial.wav", stem))
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Could not remove partial output");
        }
    }
}

#[async_trait]
impl WaveformExtractor for FfmpegExtractor {
    async fn extract(&self, input: &Path, output: &Path) -> Result<(), ExtractionFailed> {
        let partial = partial_path(output);

        info!(input = %input.display(), "Extracting canonical waveform");

        let result = run_bounded(&self.program, Self::args(input, &partial), self.timeout).await;
        if let Err(e) = result {
            remove_if_present(&partial).await;
            if let CommandError::Failed { stderr, .. } = &e {
                debug!(stderr = %stderr, "ffmpeg stderr");
            }
            return Err(ExtractionFailed::new(e.to_string()));
        }

        match tokio::fs::metadata(&partial).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                remove_if_present(&partial).await;
                return Err(ExtractionFailed::new("extractor produced no output"));
            }
        }

        if let Err(e) = tokio::fs::rename(&partial, output).await {
            remove_if_present(&partial).await;
            return Err(ExtractionFailed::new(format!(
                "could not move waveform into place: {}",
                e
            )));
        }

        Ok(())
    }
}
