//! Command-line stem separation (spleeter, demucs, or a custom tool)

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::command::{run_bounded, CommandError};
use super::{SeparationFailed, StemPaths, StemSeparator};
use crate::locator::find_file;

/// File names identifying each stem role in the separator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemFilenames {
    pub vocals: String,
    pub background: String,
}

impl Default for StemFilenames {
    fn default() -> Self {
        Self {
            vocals: "vocals.wav".to_string(),
            background: "accompaniment.wav".to_string(),
        }
    }
}

/// Search `output_dir` for both stems, at any depth
pub fn locate_stems(output_dir: &Path, names: &StemFilenames) -> Result<StemPaths, SeparationFailed> {
    let vocals = find_file(output_dir, &names.vocals);
    let background = find_file(output_dir, &names.background);
    match (vocals, background) {
        (Some(vocals), Some(background)) => Ok(StemPaths { vocals, background }),
        (vocals, background) => {
            warn!(
                output_dir = %output_dir.display(),
                vocals_found = vocals.is_some(),
                background_found = background.is_some(),
                "Separator outputs missing"
            );
            Err(SeparationFailed::outputs_not_found())
        }
    }
}

/// Runs a separation executable with a templated argument list
///
/// `{input}` and `{output}` inside any argument are replaced with the
/// waveform path and the output directory.
#[derive(Debug, Clone)]
pub struct CommandSeparator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    names: StemFilenames,
}

impl CommandSeparator {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Duration,
        names: StemFilenames,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            names,
        }
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                OsString::from(
                    arg.replace("{input}", &input)
                        .replace("{output}", &output),
                )
            })
            .collect()
    }
}

#[async_trait]
impl StemSeparator for CommandSeparator {
    async fn separate(
        &self,
        waveform: &Path,
        output_dir: &Path,
    ) -> Result<StemPaths, SeparationFailed> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| SeparationFailed::new(format!("cannot create output directory: {}", e)))?;

        info!(
            program = %self.program.display(),
            waveform = %waveform.display(),
            "Running stem separation"
        );

        if let Err(e) = run_bounded(&self.program, self.render_args(waveform, output_dir), self.timeout).await {
            if let CommandError::Failed { stderr, .. } = &e {
                debug!(stderr = %stderr, "separator stderr");
            }
            return Err(SeparationFailed::new(e.to_string()));
        }

        let dir = output_dir.to_path_buf();
        let names = self.names.clone();
        tokio::task::spawn_blocking(move || locate_stems(&dir, &names))
            .await
            .map_err(|e| SeparationFailed::new(format!("output search failed: {}", e)))?
    }
}
