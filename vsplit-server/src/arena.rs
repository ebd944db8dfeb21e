//! Filesystem arena: one working directory per session
//!
//! Layout: `<root>/<session-id>/` holding the upload, the extracted
//! waveform and the `separated/` subtree written by the separator.
//!
//! Deletion is best-effort and never fails the caller. The pipeline owns
//! its directory through an [`ArenaLease`], which also marks the session
//! as in-flight in [`ActiveSessions`] so the reclamation loop leaves it
//! alone.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::session::SessionId;

/// Name of the canonical waveform inside a session directory
pub const WAVEFORM_FILENAME: &str = "extracted_audio.wav";

/// Name of the separator output subtree inside a session directory
pub const SEPARATED_DIRNAME: &str = "separated";

/// Arena entry could not be created
#[derive(Debug, Error)]
#[error("failed to allocate session directory {path}: {source}")]
pub struct AllocationError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Result of a destroy request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The directory existed and is gone now
    Removed,
    /// There was nothing to remove
    NotFound,
    /// Some leaves could not be removed and were left behind
    Partial { remaining: usize },
}

/// One session directory seen by [`SessionArena::list_entries`]
#[derive(Debug, Clone)]
pub struct ArenaEntry {
    pub session_id: SessionId,
    pub path: PathBuf,
    /// Newest mtime in the whole session tree
    pub modified: SystemTime,
}

/// Session directories under a root folder
#[derive(Debug, Clone)]
pub struct SessionArena {
    root: PathBuf,
}

impl SessionArena {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root folder if missing
    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn session_path(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    pub fn separated_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_path(session_id).join(SEPARATED_DIRNAME)
    }

    pub fn exists(&self, session_id: &SessionId) -> bool {
        self.session_path(session_id).is_dir()
    }

    /// Create an empty directory for a fresh session id
    ///
    /// Uses `create_dir` rather than `create_dir_all`: a missing root or an
    /// id collision is reported instead of silently reusing a directory.
    pub fn allocate(&self) -> Result<(SessionId, PathBuf), AllocationError> {
        let session_id = SessionId::generate();
        let path = self.create_session_dir(&session_id)?;
        Ok((session_id, path))
    }

    fn create_session_dir(&self, session_id: &SessionId) -> Result<PathBuf, AllocationError> {
        let path = self.session_path(session_id);
        fs::create_dir(&path).map_err(|source| AllocationError {
            path: path.clone(),
            source,
        })?;
        debug!(session_id = %session_id, path = %path.display(), "Session directory allocated");
        Ok(path)
    }

    /// Allocate a session and hand back an owning lease
    pub fn lease(&self, active: &ActiveSessions) -> Result<ArenaLease, AllocationError> {
        let session_id = SessionId::generate();
        // Registered before the directory exists so no reclamation pass
        // can observe it unowned.
        active.insert(session_id);
        match self.create_session_dir(&session_id) {
            Ok(path) => Ok(ArenaLease {
                arena: self.clone(),
                active: active.clone(),
                session_id,
                path,
                armed: true,
            }),
            Err(e) => {
                active.remove(&session_id);
                Err(e)
            }
        }
    }

    /// Remove a session directory tree, best-effort and idempotent
    ///
    /// Tries whole-tree removal first. If that fails, every leaf is removed
    /// individually and per-leaf failures are logged and skipped, so one
    /// locked file never blocks reclamation of the rest.
    pub fn destroy(&self, session_id: &SessionId) -> DestroyOutcome {
        self.destroy_with(session_id, |path| fs::remove_dir_all(path), remove_entry)
    }

    fn destroy_with<T, E>(
        &self,
        session_id: &SessionId,
        remove_tree: T,
        remove_one: E,
    ) -> DestroyOutcome
    where
        T: FnOnce(&Path) -> io::Result<()>,
        E: FnMut(&Path, bool) -> io::Result<()>,
    {
        let path = self.session_path(session_id);

        match fs::symlink_metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return DestroyOutcome::NotFound,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Cannot stat session directory, attempting removal anyway");
            }
        }

        match remove_tree(&path) {
            Ok(()) => {
                debug!(session_id = %session_id, "Session directory removed");
                return DestroyOutcome::Removed;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Someone else got there first
                return DestroyOutcome::NotFound;
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "Whole-tree removal failed, falling back to per-file removal"
                );
            }
        }

        let remaining = remove_leaves(&path, remove_one);
        if remaining == 0 {
            DestroyOutcome::Removed
        } else {
            warn!(session_id = %session_id, remaining, "Session directory only partially removed");
            DestroyOutcome::Partial { remaining }
        }
    }

    /// Snapshot of session directories directly under the root
    ///
    /// Names that are not session ids are ignored. Entries that disappear
    /// while the scan runs are skipped. `modified` is the newest
    /// modification time anywhere in the session's tree, since writes deep
    /// in `separated/` do not touch the session directory itself.
    pub fn list_entries(&self) -> Vec<ArenaEntry> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Cannot list arena root");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir.flatten() {
            let Ok(file_type) = dir_entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = dir_entry.file_name();
            // Only canonical names; other UUID spellings would map elsewhere
            let Some(session_id) = name
                .to_str()
                .and_then(|n| n.parse::<SessionId>().ok().filter(|id| id.to_string() == n))
            else {
                debug!(name = ?name, "Skipping non-session entry in arena root");
                continue;
            };
            let own = match dir_entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "Skipping entry without mtime");
                    continue;
                }
            };
            let path = dir_entry.path();
            entries.push(ArenaEntry {
                session_id,
                modified: newest_mtime(&path, own),
                path,
            });
        }
        entries
    }
}

/// Latest mtime of `dir` and everything below it
///
/// Entries that vanish or cannot be read during the walk are ignored.
fn newest_mtime(dir: &Path, own: SystemTime) -> SystemTime {
    WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .fold(own, SystemTime::max)
}

fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Remove every file, then every directory deepest-first
///
/// Returns how many filesystem objects were left behind.
fn remove_leaves<E>(path: &Path, mut remove_one: E) -> usize
where
    E: FnMut(&Path, bool) -> io::Result<()>,
{
    let mut remaining = 0;

    for entry in WalkDir::new(path).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Cannot walk entry during cleanup");
                remaining += 1;
                continue;
            }
        };

        match remove_one(entry.path(), entry.file_type().is_dir()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to remove during cleanup");
                remaining += 1;
            }
        }
    }

    remaining
}

/// Sessions currently owned by a running pipeline
#[derive(Debug, Clone, Default)]
pub struct ActiveSessions {
    inner: Arc<Mutex<HashSet<SessionId>>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<SessionId>> {
        // The set stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, session_id: SessionId) -> bool {
        self.lock().insert(session_id)
    }

    pub fn remove(&self, session_id: &SessionId) -> bool {
        self.lock().remove(session_id)
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.lock().contains(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Exclusive ownership of a session directory while it is being processed
///
/// Dropping an armed lease (for example because the request future was
/// cancelled) removes the directory in the background. [`commit`] hands the
/// directory over to shared read-only use; [`abandon`] removes it and waits.
///
/// [`commit`]: ArenaLease::commit
/// [`abandon`]: ArenaLease::abandon
#[derive(Debug)]
pub struct ArenaLease {
    arena: SessionArena,
    active: ActiveSessions,
    session_id: SessionId,
    path: PathBuf,
    armed: bool,
}

impl ArenaLease {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory; it is no longer in-flight
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Remove the directory before returning
    pub async fn abandon(mut self) -> DestroyOutcome {
        self.armed = false;
        let arena = self.arena.clone();
        let session_id = self.session_id;
        match tokio::task::spawn_blocking(move || arena.destroy(&session_id)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Cleanup task failed, retrying inline");
                self.arena.destroy(&session_id)
            }
        }
    }
}

impl Drop for ArenaLease {
    fn drop(&mut self) {
        if self.armed {
            warn!(session_id = %self.session_id, "Session lease dropped mid-pipeline, cleaning up");
            let arena = self.arena.clone();
            let active = self.active.clone();
            let session_id = self.session_id;
            // Stay registered until the directory is gone
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || {
                        arena.destroy(&session_id);
                        active.remove(&session_id);
                    });
                }
                Err(_) => {
                    arena.destroy(&session_id);
                    active.remove(&session_id);
                }
            }
        } else {
            self.active.remove(&self.session_id);
        }
    }
}
