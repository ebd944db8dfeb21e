//! Session identity and lifecycle state machine
//!
//! A session moves through:
//! CREATED → UPLOADING → EXTRACTING → SEPARATING → READY → RECLAIMED
//! and may drop to FAILED from any non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque, unguessable session token (UUID v4)
///
/// Only values that parse as a UUID are accepted, so a session id can
/// always be joined onto the arena root without escaping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated lowercase, which is also the directory name
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// Arena entry allocated, nothing written yet
    Created,
    /// Upload bytes being written
    Uploading,
    /// Waveform extraction running
    Extracting,
    /// Stem separation running
    Separating,
    /// Both stems available
    Ready,
    /// Processing failed, arena entry destroyed
    Failed,
    /// Arena entry destroyed after success
    Reclaimed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Uploading)
                | (Uploading, Extracting)
                | (Extracting, Separating)
                | (Separating, Ready)
                | (Created | Uploading | Extracting | Separating, Failed)
                | (Ready, Reclaimed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Failed | SessionState::Reclaimed
        )
    }
}

/// Rejected state change
#[derive(Debug, Clone, Copy, Error)]
#[error("illegal session transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Recorded state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: SessionId,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory record of one pipeline run
#[derive(Debug, Clone)]
pub struct SessionRun {
    pub session_id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub transitions: Vec<StateTransition>,
}

impl SessionRun {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: SessionState::Created,
            created_at: Utc::now(),
            transitions: Vec::new(),
        }
    }

    /// Move to `new_state`, recording the transition
    pub fn transition_to(
        &mut self,
        new_state: SessionState,
    ) -> Result<&StateTransition, IllegalTransition> {
        if !self.state.can_transition_to(new_state) {
            return Err(IllegalTransition {
                from: self.state,
                to: new_state,
            });
        }

        tracing::debug!(
            session_id = %self.session_id,
            from = ?self.state,
            to = ?new_state,
            "Session state transition"
        );

        self.transitions.push(StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        });
        self.state = new_state;

        Ok(&self.transitions[self.transitions.len() - 1])
    }
}

/// Client-facing lookup key for one produced file
///
/// Never a stored path: the file is located at serve time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub session_id: SessionId,
    pub filename: String,
}

impl ArtifactReference {
    pub fn new(session_id: SessionId, filename: impl Into<String>) -> Self {
        Self {
            session_id,
            filename: filename.into(),
        }
    }

    /// Inline playback URL
    pub fn serve_url(&self) -> String {
        format!("/serve-file/{}/{}", self.session_id, self.filename)
    }

    /// Forced-download URL
    pub fn download_url(&self) -> String {
        format!("/download-file/{}/{}", self.session_id, self.filename)
    }
}
