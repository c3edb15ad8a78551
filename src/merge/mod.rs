//! Record-level three-way merge.
//!
//! - [`diff`](mod@diff) classifies every record key and merges fields.
//! - [`conflict`] is the structured conflict model handed to resolvers.
//! - [`resolve`] holds the resolver trait and built-in strategies.
//! - [`result`] is the [`MergeResult`] contract returned by the sync engine.
//!
//! [`merge_collections`] runs diff and resolution without git, for merging
//! three files offline.

pub mod conflict;
pub mod diff;
pub mod resolve;
pub mod result;

pub use conflict::{ConflictKind, FieldConflict, RecordConflict, Side};
pub use diff::{ChangeClass, RecordDiff, ResolutionError, diff};
pub use resolve::{Abandon, ConflictResolver, Prefer, Strategy};
pub use result::{MergeResult, MergeSummary};

use crate::error::SyncError;
use crate::record::RecordCollection;

/// Merge a diff, calling `resolver` once if it has conflicts.
///
/// # Errors
/// [`SyncError::ResolutionAbandoned`] if the resolver gives up,
/// [`SyncError::InvalidResolution`] if its output cannot be applied.
pub fn resolve_diff(
    diff: &RecordDiff,
    remote: &RecordCollection,
    resolver: &mut dyn ConflictResolver,
) -> Result<RecordCollection, SyncError> {
    if diff.is_clean() {
        return Ok(diff.merged().clone());
    }
    tracing::info!(conflicts = diff.conflicts().len(), "invoking conflict resolver");
    let resolved = resolver
        .resolve(diff.conflicts(), remote)
        .ok_or(SyncError::ResolutionAbandoned {
            conflicts: diff.conflicts().len(),
        })?;
    diff.apply_resolution(&resolved)
        .map_err(|e| SyncError::InvalidResolution(e.to_string()))
}

/// Three-way merge of already-decoded collections, outside any repository.
#[must_use]
pub fn merge_collections(
    base: &RecordCollection,
    local: &RecordCollection,
    remote: &RecordCollection,
    resolver: &mut dyn ConflictResolver,
) -> MergeResult {
    let d = diff(base, local, remote);
    let mut notes = Vec::new();
    if d.is_clean() && d.merged().same_content(local) {
        notes.push("nothing to merge".to_owned());
    }
    match resolve_diff(&d, remote, resolver) {
        Ok(merged) => MergeResult::succeeded(merged, None, notes),
        Err(err) => MergeResult::failed(err, d.conflicts().to_vec(), None, notes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordKey};

    fn one(author: &str) -> RecordCollection {
        RecordCollection::from_records([
            Record::new(RecordKey::new("a")).with_field("author", author)
        ])
        .unwrap()
    }

    #[test]
    fn conflict_blocks_success_until_resolved() {
        let (b, l, r) = (one("X"), one("X-local"), one("X-remote"));

        let result = merge_collections(&b, &l, &r, &mut Abandon);
        assert!(!result.success());
        assert_eq!(result.conflicts().len(), 1);
        assert_eq!(result.conflicts()[0].fields[0].field, "author");

        let result = merge_collections(&b, &l, &r, &mut Prefer(Side::Remote));
        assert!(result.success());
        let merged = result.merged().unwrap();
        assert_eq!(merged.get(&RecordKey::new("a").unwrap()).unwrap().get("author"), Some("X-remote"));
    }

    #[test]
    fn clean_merge_never_calls_resolver() {
        let (b, l) = (one("X"), one("Y"));
        let mut called = false;
        let mut resolver = |_: &[RecordConflict], _: &RecordCollection| {
            called = true;
            None
        };
        let result = merge_collections(&b, &l, &b, &mut resolver);
        assert!(result.success());
        assert!(!called);
    }

    #[test]
    fn nothing_to_merge_note() {
        let b = one("X");
        let result = merge_collections(&b, &b, &b, &mut Abandon);
        assert_eq!(result.notes(), ["nothing to merge"]);
    }
}
