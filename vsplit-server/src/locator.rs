//! Artifact lookup by recursive search
//!
//! Separator backends nest their output at different depths
//! (`separated/<track>/vocals.wav`, `separated/<model>/<track>/vocals.wav`),
//! so files are found by base name, never by a fixed path.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::arena::SessionArena;
use crate::session::SessionId;

/// No file matched the lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("artifact not found")]
pub struct NotFound;

/// Whether `filename` is a single plain path component
///
/// Rejects separators, `.`/`..` and empty names so a lookup key can never
/// address anything outside the tree being searched.
pub fn is_plain_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\', '\0'])
}

/// First regular file named `filename` anywhere below `dir`
///
/// Walk order is sorted by name so results are deterministic. Unreadable
/// entries are skipped.
pub fn find_file(dir: &Path, filename: &str) -> Option<PathBuf> {
    if !is_plain_filename(filename) {
        return None;
    }

    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == filename)
        .map(|entry| entry.into_path())
}

/// Resolves artifact references to files inside a session's output tree
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    arena: SessionArena,
}

impl ArtifactLocator {
    pub fn new(arena: SessionArena) -> Self {
        Self { arena }
    }

    /// Path of `filename` within the session's separated subtree
    ///
    /// A missing session, a missing subtree and a missing file all report
    /// [`NotFound`]; so does any I/O error hit while searching.
    pub fn resolve(&self, session_id: &SessionId, filename: &str) -> Result<PathBuf, NotFound> {
        let separated = self.arena.separated_path(session_id);
        if !separated.is_dir() {
            return Err(NotFound);
        }
        find_file(&separated, filename).ok_or(NotFound)
    }

    /// [`resolve`](Self::resolve) off the async runtime
    pub async fn resolve_blocking(
        &self,
        session_id: SessionId,
        filename: String,
    ) -> Result<PathBuf, NotFound> {
        let locator = self.clone();
        tokio::task::spawn_blocking(move || locator.resolve(&session_id, &filename))
            .await
            .unwrap_or(Err(NotFound))
    }
}
