//! Bounded child-process execution shared by the tool adapters

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Child process did not complete successfully
#[derive(Debug, Error)]
pub enum CommandError {
    /// Executable not found on PATH
    #[error("executable not found: {0}")]
    NotFound(PathBuf),

    /// Could not start the process
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Wall-clock limit exceeded; the child was killed
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: PathBuf, timeout: Duration },

    /// Non-zero exit
    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

/// Longest stderr tail kept in error values
const STDERR_TAIL_CHARS: usize = 2000;

/// Run `program args…`, capture its output and enforce `timeout`
///
/// The child is spawned with `kill_on_drop`, so dropping the future on
/// timeout (or cancellation of the caller) terminates the process.
pub async fn run_bounded<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> Result<Output, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            CommandError::NotFound(program.to_path_buf())
        } else {
            CommandError::Spawn {
                program: program.to_path_buf(),
                source,
            }
        }
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CommandError::Spawn {
                program: program.to_path_buf(),
                source,
            })
        }
        Err(_) => {
            return Err(CommandError::Timeout {
                program: program.to_path_buf(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.to_path_buf(),
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(output)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}
