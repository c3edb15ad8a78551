//! Error taxonomy for sync attempts.
//!
//! Every failure of [`crate::sync::SyncEngine`] is one [`SyncError`]. The
//! variants callers are expected to branch on are `Transport` (retry later),
//! `PushRace` (re-run the whole sync) and `ResolutionAbandoned` (nothing was
//! written). The rest are fatal for the attempt.

use std::io;

use bibsync_git::GitError;

use crate::codec::CodecError;
use crate::sync::SyncPhase;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Network or authentication failure talking to a remote.
    #[error("transport error talking to `{remote}`: {message}")]
    Transport { remote: String, message: String },

    /// A revision, branch or file the attempt needs does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A version of the file could not be decoded.
    #[error("cannot parse {path} ({version}): {source}")]
    Parse {
        path: String,
        /// `base`, `local`, `remote` or a file path.
        version: String,
        #[source]
        source: CodecError,
    },

    /// The remote moved between fetch and push. Re-run the whole sync.
    #[error("push to `{remote}` rejected, the remote moved since fetch: {message}")]
    PushRace { remote: String, message: String },

    /// The remote refused the push (hook, protected branch, permissions).
    /// The local commit stands; re-running will not help.
    #[error("push to `{remote}` refused: {message}")]
    PushRefused { remote: String, message: String },

    /// The resolver declined to resolve. Nothing was written.
    #[error("resolution abandoned with {conflicts} unresolved conflict(s)")]
    ResolutionAbandoned { conflicts: usize },

    /// Cancelled before anything was committed.
    #[error("sync cancelled during {phase}")]
    Cancelled { phase: SyncPhase },

    /// Other files changed differently on both sides.
    #[error("paths outside the bibliography changed on both sides: {}", .paths.join(", "))]
    UnrelatedPathConflict { paths: Vec<String> },

    /// Files the merge must overwrite have uncommitted changes.
    #[error("uncommitted changes would be overwritten: {}", .paths.join(", "))]
    DirtyWorkingCopy { paths: Vec<String> },

    /// The resolver's output could not be applied.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// The configured branch or remote cannot be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("git: {0}")]
    Git(GitError),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Internal state machine violation.
    #[error("invalid sync phase transition: {from} → {to}")]
    InvalidTransition { from: SyncPhase, to: SyncPhase },
}

impl From<GitError> for SyncError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::NotFound { message } => Self::NotFound(message),
            GitError::Transport { remote, message } => Self::Transport { remote, message },
            GitError::PushRejected { remote, message } => Self::PushRace { remote, message },
            GitError::PushRefused { remote, message } => Self::PushRefused { remote, message },
            other => Self::Git(other),
        }
    }
}

impl SyncError {
    /// Whether re-running the same sync may succeed without user action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::PushRace { .. })
    }
}
