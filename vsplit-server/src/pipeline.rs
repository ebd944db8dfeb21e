//! Session pipeline: upload → extract → separate → ready
//!
//! Every run owns its session directory through an [`ArenaLease`]. Any
//! failure destroys the directory before the error is returned; a run that
//! is cancelled (the future is dropped) is cleaned up by the lease's drop
//! guard, and its in-flight tool task is aborted.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::arena::{
    ActiveSessions, AllocationError, ArenaLease, SessionArena, SEPARATED_DIRNAME,
    WAVEFORM_FILENAME,
};
use crate::locator::is_plain_filename;
use crate::session::{ArtifactReference, IllegalTransition, SessionId, SessionRun, SessionState};
use crate::tools::{
    ExtractionFailed, SeparationFailed, StemPaths, StemSeparator, WaveformExtractor,
};

/// Fallback name for uploads without a usable file name
pub const DEFAULT_UPLOAD_NAME: &str = "upload.bin";

const MAX_UPLOAD_NAME_CHARS: usize = 200;

/// Why a pipeline run failed
///
/// The wrapped causes are internal detail for logs only.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Stream broke, disk full, or size cap exceeded
    #[error("upload failed: {0}")]
    Upload(#[source] io::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionFailed),

    #[error(transparent)]
    Separation(#[from] SeparationFailed),

    #[error(transparent)]
    State(#[from] IllegalTransition),
}

impl PipelineError {
    /// Stage name for logs
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Allocation(_) => "allocation",
            PipelineError::Upload(_) => "upload",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::Separation(_) => "separation",
            PipelineError::State(_) => "state",
        }
    }
}

/// Successful run
#[derive(Debug, Clone)]
pub struct ProcessedSession {
    pub session_id: SessionId,
    pub vocals: ArtifactReference,
    pub background: ArtifactReference,
    pub run: SessionRun,
}

/// Aborts the wrapped task when dropped
struct StageTask<T>(JoinHandle<T>);

impl<T> Drop for StageTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Orchestrates one session from upload to ready stems
#[derive(Clone)]
pub struct SessionPipeline {
    arena: SessionArena,
    active: ActiveSessions,
    extractor: Arc<dyn WaveformExtractor>,
    separator: Arc<dyn StemSeparator>,
    max_upload_bytes: Option<u64>,
}

impl SessionPipeline {
    pub fn new(
        arena: SessionArena,
        active: ActiveSessions,
        extractor: Arc<dyn WaveformExtractor>,
        separator: Arc<dyn StemSeparator>,
    ) -> Self {
        Self {
            arena,
            active,
            extractor,
            separator,
            max_upload_bytes: None,
        }
    }

    /// Reject uploads larger than `limit` bytes
    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = Some(limit);
        self
    }

    pub fn arena(&self) -> &SessionArena {
        &self.arena
    }

    pub fn active(&self) -> &ActiveSessions {
        &self.active
    }

    /// Run a complete session over an upload stream
    ///
    /// On error the session directory no longer exists when this returns.
    pub async fn process<R>(
        &self,
        original_name: Option<&str>,
        upload: R,
    ) -> Result<ProcessedSession, PipelineError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let lease = self.arena.lease(&self.active)?;
        let session_id = lease.session_id();
        let mut run = SessionRun::new(session_id);

        info!(session_id = %session_id, "Session created");

        let outcome = self.run_stages(&lease, &mut run, original_name, upload).await;
        let finished = outcome.and_then(|stems| {
            let references = build_references(session_id, &stems)?;
            run.transition_to(SessionState::Ready)?;
            Ok(references)
        });

        match finished {
            Ok((vocals, background)) => {
                lease.commit();
                info!(
                    session_id = %session_id,
                    vocals = %vocals.filename,
                    background = %background.filename,
                    "Session ready"
                );
                Ok(ProcessedSession {
                    session_id,
                    vocals,
                    background,
                    run,
                })
            }
            Err(e) => Err(self.fail(lease, &mut run, e).await),
        }
    }

    async fn fail(
        &self,
        lease: ArenaLease,
        run: &mut SessionRun,
        err: PipelineError,
    ) -> PipelineError {
        let session_id = lease.session_id();
        let failed_in = run.state;
        // Failed is reachable from every working state
        let _ = run.transition_to(SessionState::Failed);

        error!(
            session_id = %session_id,
            stage = err.stage(),
            state = ?failed_in,
            error = %err,
            "Session failed, removing working directory"
        );

        let outcome = lease.abandon().await;
        tracing::debug!(session_id = %session_id, outcome = ?outcome, "Failed session cleaned up");
        err
    }

    async fn run_stages<R>(
        &self,
        lease: &ArenaLease,
        run: &mut SessionRun,
        original_name: Option<&str>,
        upload: R,
    ) -> Result<StemPaths, PipelineError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let session_dir = lease.path().to_path_buf();

        // 1. Upload
        run.transition_to(SessionState::Uploading)?;
        let upload_path = session_dir.join(sanitize_upload_name(original_name));
        let bytes = write_upload(upload, &upload_path, self.max_upload_bytes)
            .await
            .map_err(PipelineError::Upload)?;
        info!(session_id = %run.session_id, bytes, "Upload stored");

        // 2. Extract
        run.transition_to(SessionState::Extracting)?;
        let waveform = session_dir.join(WAVEFORM_FILENAME);
        let extractor = Arc::clone(&self.extractor);
        let (input, output) = (upload_path.clone(), waveform.clone());
        let mut task = StageTask(tokio::spawn(async move {
            extractor.extract(&input, &output).await
        }));
        (&mut task.0)
            .await
            .map_err(|e| ExtractionFailed::new(format!("extractor task aborted: {}", e)))??;

        // 3. Separate
        run.transition_to(SessionState::Separating)?;
        let separated = session_dir.join(SEPARATED_DIRNAME);
        let separator = Arc::clone(&self.separator);
        let (input, output) = (waveform.clone(), separated.clone());
        let mut task = StageTask(tokio::spawn(async move {
            separator.separate(&input, &output).await
        }));
        let stems = (&mut task.0)
            .await
            .map_err(|e| SeparationFailed::new(format!("separator task aborted: {}", e)))??;

        verify_stems(&separated, &stems).await?;
        Ok(stems)
    }
}

/// Stems must live under the session's output tree and be non-empty
async fn verify_stems(separated: &Path, stems: &StemPaths) -> Result<(), SeparationFailed> {
    for path in [&stems.vocals, &stems.background] {
        if !path.starts_with(separated) {
            return Err(SeparationFailed::new(format!(
                "output {} outside separation directory",
                path.display()
            )));
        }
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => return Err(SeparationFailed::new(format!("output {} missing or empty", path.display()))),
        }
    }
    Ok(())
}

fn build_references(
    session_id: SessionId,
    stems: &StemPaths,
) -> Result<(ArtifactReference, ArtifactReference), SeparationFailed> {
    let name_of = |path: &PathBuf| {
        path.file_name()
            .and_then(|n| n.to_str())
            .filter(|n| is_plain_filename(n))
            .map(str::to_string)
            .ok_or_else(|| SeparationFailed::new(format!("unusable output name {}", path.display())))
    };
    let vocals = name_of(&stems.vocals)?;
    let background = name_of(&stems.background)?;
    if vocals == background {
        return Err(SeparationFailed::new("vocal and background outputs share a name"));
    }
    Ok((
        ArtifactReference::new(session_id, vocals),
        ArtifactReference::new(session_id, background),
    ))
}

/// Stream the upload to disk, enforcing the optional size cap
async fn write_upload<R>(upload: R, path: &Path, limit: Option<u64>) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = tokio::fs::File::create(path).await?;

    let written = match limit {
        Some(limit) => {
            let mut limited = upload.take(limit.saturating_add(1));
            let written = tokio::io::copy(&mut limited, &mut file).await?;
            if written > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("upload exceeds {} bytes", limit),
                ));
            }
            written
        }
        None => {
            let mut upload = upload;
            tokio::io::copy(&mut upload, &mut file).await?
        }
    };

    file.flush().await?;
    Ok(written)
}

/// Reduce a client-supplied file name to a safe single component
///
/// Names that would collide with the pipeline's own files get an
/// `upload_` prefix.
pub fn sanitize_upload_name(original: Option<&str>) -> String {
    let base = original
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(""))
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_UPLOAD_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return DEFAULT_UPLOAD_NAME.to_string();
    }

    let reserved = cleaned == WAVEFORM_FILENAME
        || cleaned == SEPARATED_DIRNAME
        || cleaned.ends_with(".partial.wav");
    if reserved {
        format!("upload_{}", cleaned)
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoExtractor;

    #[async_trait]
    impl WaveformExtractor for NoExtractor {
        async fn extract(&self, _input: &Path, _output: &Path) -> Result<(), ExtractionFailed> {
            Err(ExtractionFailed::new("not available"))
        }
    }

    struct NoSeparator;

    #[async_trait]
    impl StemSeparator for NoSeparator {
        async fn separate(
            &self,
            _waveform: &Path,
            _output_dir: &Path,
        ) -> Result<StemPaths, SeparationFailed> {
            Err(SeparationFailed::outputs_not_found())
        }
    }

    #[tokio::test]
    async fn test_state_error_removes_session_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = SessionPipeline::new(
            SessionArena::new(dir.path()),
            ActiveSessions::new(),
            Arc::new(NoExtractor),
            Arc::new(NoSeparator),
        );
        let lease = pipeline.arena.lease(&pipeline.active).unwrap();
        let session_id = lease.session_id();
        tokio::fs::write(lease.path().join("upload.mp4"), b"data").await.unwrap();

        let mut run = SessionRun::new(session_id);
        run.transition_to(SessionState::Uploading).unwrap();
        let err = run.transition_to(SessionState::Ready).unwrap_err();

        let err = pipeline.fail(lease, &mut run, err.into()).await;
        assert_eq!(err.stage(), "state");
        assert_eq!(run.state, SessionState::Failed);
        assert!(!pipeline.arena.exists(&session_id));
        assert!(pipeline.active.is_empty());
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_upload_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_upload_name(Some("C:\\Users\\me\\clip.mp4")), "clip.mp4");
        assert_eq!(sanitize_upload_name(Some("song.mp3")), "song.mp3");
    }

    #[test]
    fn test_sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_upload_name(None), DEFAULT_UPLOAD_NAME);
        assert_eq!(sanitize_upload_name(Some("")), DEFAULT_UPLOAD_NAME);
        assert_eq!(sanitize_upload_name(Some("dir/")), DEFAULT_UPLOAD_NAME);
        assert_eq!(sanitize_upload_name(Some("..")), DEFAULT_UPLOAD_NAME);
    }

    #[test]
    fn test_sanitize_avoids_reserved_names() {
        assert_eq!(
            sanitize_upload_name(Some("extracted_audio.wav")),
            "upload_extracted_audio.wav"
        );
        assert_eq!(sanitize_upload_name(Some("separated")), "upload_separated");
    }

    #[tokio::test]
    async fn test_write_upload_enforces_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("up.bin");

        let ok = write_upload(&b"12345"[..], &path, Some(5)).await.unwrap();
        assert_eq!(ok, 5);

        let err = write_upload(&b"123456"[..], &path, Some(5)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_build_references_rejects_identical_names() {
        let id = SessionId::generate();
        let stems = StemPaths {
            vocals: PathBuf::from("/s/a/out.wav"),
            background: PathBuf::from("/s/b/out.wav"),
        };
        assert!(build_references(id, &stems).is_err());
    }
}
