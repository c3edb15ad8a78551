//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all [`GitRepo`](crate::GitRepo) trait
//! methods. It uses rich enum variants so callers can match on specific failure
//! modes (missing object, rejected push, transport failure) without parsing
//! error messages.

use thiserror::Error;

/// Errors returned by [`GitRepo`](crate::GitRepo) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested object, ref, or path was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// A ref update failed because the ref's current value did not match the
    /// expected old value (compare-and-swap / optimistic concurrency failure).
    #[error("ref conflict on `{ref_name}`: {message}")]
    RefConflict {
        /// The ref that could not be updated.
        ref_name: String,
        /// Details about the mismatch.
        message: String,
    },

    /// An OID string could not be parsed or was otherwise invalid.
    #[error("invalid OID `{value}`: {reason}")]
    InvalidOid {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// An I/O error occurred (file system, process spawn, etc.).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The remote refused a push because its branch moved (non-fast-forward).
    #[error("push to `{remote}` rejected: {message}")]
    PushRejected {
        /// The remote name (e.g., `"origin"`).
        remote: String,
        /// The rejection reason reported by git.
        message: String,
    },

    /// The remote refused a push for a reason other than a moved branch
    /// (a hook declined it, the branch is protected, permission denied).
    /// Retrying without outside intervention will not help.
    #[error("push to `{remote}` refused: {message}")]
    PushRefused {
        /// The remote name (e.g., `"origin"`).
        remote: String,
        /// The refusal reason reported by git.
        message: String,
    },

    /// Talking to a remote failed (network, authentication, unknown remote).
    #[error("transport error talking to `{remote}`: {message}")]
    Transport {
        /// The remote name (e.g., `"origin"`).
        remote: String,
        /// Trimmed stderr from git.
        message: String,
    },

    /// The underlying git backend (gix, CLI, etc.) returned an unclassified error.
    ///
    /// This is the catch-all for errors that don't fit other variants. The
    /// `message` should include enough context to diagnose the failure.
    #[error("git backend error: {message}")]
    BackendError {
        /// Freeform error description from the backend.
        message: String,
    },
}

impl GitError {
    /// Returns `true` for [`GitError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
