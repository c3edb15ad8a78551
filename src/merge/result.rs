//! The output contract of a sync attempt.

use serde::Serialize;

use bibsync_git::GitOid;

use crate::error::SyncError;
use crate::record::RecordCollection;
use crate::sync::SyncPhase;

use super::conflict::RecordConflict;

/// Outcome of one sync attempt.
///
/// `merged` is present iff the attempt succeeded. `conflicts` is non-empty
/// only when a failure left conflicts unresolved (abandon, invalid
/// resolution, cancellation while waiting on the resolver).
#[derive(Debug)]
pub struct MergeResult {
    phase: SyncPhase,
    merged: Option<RecordCollection>,
    conflicts: Vec<RecordConflict>,
    error: Option<SyncError>,
    commit: Option<GitOid>,
    notes: Vec<String>,
}

impl MergeResult {
    /// A successful attempt. `commit` is the new local head if it moved.
    #[must_use]
    pub const fn succeeded(
        merged: RecordCollection,
        commit: Option<GitOid>,
        notes: Vec<String>,
    ) -> Self {
        Self {
            phase: SyncPhase::Done,
            merged: Some(merged),
            conflicts: Vec::new(),
            error: None,
            commit,
            notes,
        }
    }

    /// A failed attempt, with any conflicts that were left unresolved.
    #[must_use]
    pub const fn failed(
        error: SyncError,
        conflicts: Vec<RecordConflict>,
        commit: Option<GitOid>,
        notes: Vec<String>,
    ) -> Self {
        Self {
            phase: SyncPhase::Failed,
            merged: None,
            conflicts,
            error: Some(error),
            commit,
            notes,
        }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.merged.is_some()
    }

    /// Terminal phase: `Done` or `Failed`.
    #[must_use]
    pub const fn phase(&self) -> SyncPhase {
        self.phase
    }

    #[must_use]
    pub const fn merged(&self) -> Option<&RecordCollection> {
        self.merged.as_ref()
    }

    #[must_use]
    pub fn conflicts(&self) -> &[RecordConflict] {
        &self.conflicts
    }

    #[must_use]
    pub const fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    /// Commit created (or fast-forwarded to) by this attempt. On failure this
    /// is set only when the failure happened after committing, e.g. a push
    /// race.
    #[must_use]
    pub const fn commit(&self) -> Option<GitOid> {
        self.commit
    }

    #[must_use]
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Convert into a `Result`, discarding notes.
    ///
    /// # Errors
    /// Returns the attempt's [`SyncError`] on failure.
    pub fn into_result(self) -> Result<RecordCollection, SyncError> {
        match (self.merged, self.error) {
            (Some(merged), _) => Ok(merged),
            (None, Some(err)) => Err(err),
            (None, None) => Err(SyncError::InvalidTransition {
                from: self.phase,
                to: SyncPhase::Done,
            }),
        }
    }

    /// Serializable view, printed by `bibsync --json`.
    #[must_use]
    pub fn summary(&self) -> MergeSummary<'_> {
        MergeSummary {
            success: self.success(),
            phase: self.phase,
            records: self.merged.as_ref().map(RecordCollection::len),
            commit: self.commit.map(|c| c.to_string()),
            error: self.error.as_ref().map(ToString::to_string),
            conflicts: &self.conflicts,
            notes: &self.notes,
        }
    }
}

/// Serializable view of a [`MergeResult`].
#[derive(Debug, Serialize)]
pub struct MergeSummary<'a> {
    pub success: bool,
    pub phase: SyncPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_empty")]
    pub conflicts: &'a [RecordConflict],
    #[serde(skip_serializing_if = "is_empty")]
    pub notes: &'a [String],
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}
