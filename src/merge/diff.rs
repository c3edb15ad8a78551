//! Record-level three-way diff.
//!
//! Every key in `base ∪ local ∪ remote` is classified by where it is present
//! and whether each side changed it relative to base:
//!
//! | base | local | remote | outcome |
//! |------|-------|--------|---------|
//! | -    | yes   | -      | added locally, kept |
//! | -    | -     | yes    | added remotely, kept |
//! | -    | yes   | yes    | field merge with an empty base, `AddAdd` on clash |
//! | yes  | -     | -      | removed on both sides |
//! | yes  | yes   | -      | deletion accepted if local is unchanged, else `ModifyDelete` |
//! | yes  | -     | yes    | deletion accepted if remote is unchanged, else `ModifyDelete` |
//! | yes  | yes   | yes    | per-field merge, `BothModified` on clash |
//!
//! Per field, the rule is the usual one: if only one side differs from base
//! take that side; if both differ to the same value take it; otherwise
//! conflict. Values compare by exact string equality, with "absent" as a
//! value of its own.
//!
//! # Output order
//!
//! 1. Records local shares with base, in local order. Records local deleted
//!    but which survive as a conflict follow, in base order.
//! 2. Remote-only additions, in remote order.
//! 3. Local-only additions (including keys added on both sides and unkeyed
//!    local records), in local order.
//!
//! Field order inside a merged record is local's order, then fields only
//! remote has, in remote's order.
//!
//! Unkeyed records never match across versions. Local ones are kept; remote
//! ones are appended unless an identical record already exists in base or
//! local.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::record::{Record, RecordCollection, RecordKey};

use super::conflict::{ConflictKind, FieldConflict, RecordConflict, Side};

/// How a key changed between base and the two sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    Unchanged,
    AddedLocal,
    AddedRemote,
    AddedBoth,
    RemovedLocal,
    RemovedRemote,
    RemovedBoth,
    ModifiedLocal,
    ModifiedRemote,
    ModifiedBoth,
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::AddedLocal => "added-local",
            Self::AddedRemote => "added-remote",
            Self::AddedBoth => "added-both",
            Self::RemovedLocal => "removed-local",
            Self::RemovedRemote => "removed-remote",
            Self::RemovedBoth => "removed-both",
            Self::ModifiedLocal => "modified-local",
            Self::ModifiedRemote => "modified-remote",
            Self::ModifiedBoth => "modified-both",
        };
        f.write_str(s)
    }
}

/// One position in the merged output.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot {
    Clean(Record),
    Conflicted(RecordKey),
}

/// Output of [`diff`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordDiff {
    merged: RecordCollection,
    conflicts: Vec<RecordConflict>,
    classifications: BTreeMap<RecordKey, ChangeClass>,
    layout: Vec<Slot>,
}

/// A resolver's output could not be applied.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("resolution drops `{key}`, which neither side deleted")]
pub struct ResolutionError {
    pub key: RecordKey,
}

impl RecordDiff {
    /// Records merged without conflict, in output order. Conflicted records
    /// are not included.
    #[must_use]
    pub const fn merged(&self) -> &RecordCollection {
        &self.merged
    }

    #[must_use]
    pub fn conflicts(&self) -> &[RecordConflict] {
        &self.conflicts
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    #[must_use]
    pub const fn classifications(&self) -> &BTreeMap<RecordKey, ChangeClass> {
        &self.classifications
    }

    #[must_use]
    pub fn classification(&self, key: &RecordKey) -> Option<ChangeClass> {
        self.classifications.get(key).copied()
    }

    /// Splice a resolver's output into the merge layout.
    ///
    /// - A conflicted key present in `resolved` takes the resolved record in
    ///   its original slot.
    /// - A conflicted key absent from `resolved` is dropped. This is only
    ///   allowed for modify/delete conflicts (accepting the deletion).
    /// - A resolved record for a key that merged cleanly replaces it.
    /// - Resolved records with new keys are appended, as are unkeyed
    ///   resolved records not already present.
    ///
    /// # Errors
    /// Returns [`ResolutionError`] if a both-modified or add/add conflict is
    /// missing from `resolved`.
    pub fn apply_resolution(
        &self,
        resolved: &RecordCollection,
    ) -> Result<RecordCollection, ResolutionError> {
        let mut out = RecordCollection::new();
        let mut seen: HashSet<&RecordKey> = HashSet::new();

        for slot in &self.layout {
            match slot {
                Slot::Clean(record) => {
                    let chosen = record
                        .key()
                        .and_then(|k| {
                            seen.insert(k);
                            resolved.get(k)
                        })
                        .unwrap_or(record);
                    out.push_or_replace(chosen.clone());
                }
                Slot::Conflicted(key) => {
                    seen.insert(key);
                    if let Some(record) = resolved.get(key) {
                        out.push_or_replace(record.clone());
                    } else if !self.deletion_allowed(key) {
                        return Err(ResolutionError { key: key.clone() });
                    }
                }
            }
        }

        for record in resolved {
            match record.key() {
                Some(key) if seen.contains(key) => {}
                Some(_) => out.push_or_replace(record.clone()),
                None => {
                    if !out.iter().any(|r| r.same_content(record)) {
                        out.push_or_replace(record.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    fn deletion_allowed(&self, key: &RecordKey) -> bool {
        self.conflicts
            .iter()
            .find(|c| c.key == *key)
            .is_some_and(|c| matches!(c.kind, ConflictKind::ModifyDelete { .. }))
    }
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

/// Three-way diff of record collections.
#[must_use]
pub fn diff(
    base: &RecordCollection,
    local: &RecordCollection,
    remote: &RecordCollection,
) -> RecordDiff {
    let mut builder = Builder::default();

    // 1. Local records that base also has, in local order.
    let mut local_additions: Vec<&Record> = Vec::new();
    for record in local {
        match record.key() {
            Some(key) if base.contains_key(key) => builder.visit(key, base, local, remote),
            _ => local_additions.push(record),
        }
    }
    //    Base records local deleted; they survive only as conflicts.
    for key in base.keys() {
        if !local.contains_key(key) {
            builder.visit(key, base, local, remote);
        }
    }

    // 2. Remote-only additions.
    for record in remote {
        match record.key() {
            Some(key) if !base.contains_key(key) && !local.contains_key(key) => {
                builder.visit(key, base, local, remote);
            }
            Some(_) => {}
            None => {
                let known = base.iter().chain(local.iter()).any(|r| r.same_content(record));
                if !known {
                    builder.layout.push(Slot::Clean(record.clone()));
                }
            }
        }
    }

    // 3. Local-only additions (and added-both).
    for record in local_additions {
        match record.key() {
            Some(key) => builder.visit(key, base, local, remote),
            None => builder.layout.push(Slot::Clean(record.clone())),
        }
    }

    builder.finish()
}

#[derive(Default)]
struct Builder {
    conflicts: Vec<RecordConflict>,
    classifications: BTreeMap<RecordKey, ChangeClass>,
    layout: Vec<Slot>,
}

impl Builder {
    fn visit(
        &mut self,
        key: &RecordKey,
        base: &RecordCollection,
        local: &RecordCollection,
        remote: &RecordCollection,
    ) {
        let (b, l, r) = (base.get(key), local.get(key), remote.get(key));
        let class = match (b, l, r) {
            (None, Some(l), None) => {
                self.keep(l.clone());
                ChangeClass::AddedLocal
            }
            (None, None, Some(r)) => {
                self.keep(r.clone());
                ChangeClass::AddedRemote
            }
            (None, Some(l), Some(r)) => {
                self.merge(key, None, l, r, ConflictKind::AddAdd);
                ChangeClass::AddedBoth
            }
            (Some(_), None, None) => ChangeClass::RemovedBoth,
            (Some(b), Some(l), None) => {
                if !l.same_content(b) {
                    self.modify_delete(key, b, l, Side::Remote);
                }
                ChangeClass::RemovedRemote
            }
            (Some(b), None, Some(r)) => {
                if !r.same_content(b) {
                    self.modify_delete(key, b, r, Side::Local);
                }
                ChangeClass::RemovedLocal
            }
            (Some(b), Some(l), Some(r)) => {
                self.merge(key, Some(b), l, r, ConflictKind::BothModified);
                match (l.same_content(b), r.same_content(b)) {
                    (true, true) => ChangeClass::Unchanged,
                    (false, true) => ChangeClass::ModifiedLocal,
                    (true, false) => ChangeClass::ModifiedRemote,
                    (false, false) => ChangeClass::ModifiedBoth,
                }
            }
            (None, None, None) => return,
        };
        self.classifications.insert(key.clone(), class);
    }

    fn keep(&mut self, record: Record) {
        self.layout.push(Slot::Clean(record));
    }

    fn merge(
        &mut self,
        key: &RecordKey,
        base: Option<&Record>,
        local: &Record,
        remote: &Record,
        kind: ConflictKind,
    ) {
        let (merged, fields) = merge_fields(key, base, local, remote);
        if fields.is_empty() {
            self.keep(merged);
            return;
        }
        self.layout.push(Slot::Conflicted(key.clone()));
        self.conflicts.push(RecordConflict {
            key: key.clone(),
            kind,
            base: base.cloned(),
            local: Some(local.clone()),
            remote: Some(remote.clone()),
            merged,
            fields,
        });
    }

    /// `survivor` is the edited record on the side that did not delete.
    fn modify_delete(&mut self, key: &RecordKey, base: &Record, survivor: &Record, deleted_on: Side) {
        // Emptying a record on one side and deleting it on the other agree.
        if survivor.fields().is_empty() {
            return;
        }
        let fields = survivor
            .fields()
            .iter()
            .map(|f| {
                let kept = Some(f.value.clone());
                let (local, remote) = match deleted_on {
                    Side::Local => (None, kept),
                    Side::Remote => (kept, None),
                };
                FieldConflict {
                    key: key.clone(),
                    field: f.name.clone(),
                    base: base.get(&f.name).map(str::to_owned),
                    local,
                    remote,
                }
            })
            .collect();
        let (local, remote) = match deleted_on {
            Side::Local => (None, Some(survivor.clone())),
            Side::Remote => (Some(survivor.clone()), None),
        };
        self.layout.push(Slot::Conflicted(key.clone()));
        self.conflicts.push(RecordConflict {
            key: key.clone(),
            kind: ConflictKind::ModifyDelete { deleted_on },
            base: Some(base.clone()),
            local,
            remote,
            merged: survivor.clone(),
            fields,
        });
    }

    fn finish(self) -> RecordDiff {
        let mut merged = RecordCollection::new();
        for slot in &self.layout {
            if let Slot::Clean(record) = slot {
                merged.push_or_replace(record.clone());
            }
        }
        RecordDiff {
            merged,
            conflicts: self.conflicts,
            classifications: self.classifications,
            layout: self.layout,
        }
    }
}

/// Per-field three-way merge. Returns the merged record (conflicting fields
/// hold the local value when there is one) and the conflicting fields.
fn merge_fields(
    key: &RecordKey,
    base: Option<&Record>,
    local: &Record,
    remote: &Record,
) -> (Record, Vec<FieldConflict>) {
    let names: Vec<&str> = local
        .field_names()
        .chain(remote.field_names().filter(|n| !local.contains(n)))
        .collect();

    let mut merged = Record::new(local.key().cloned());
    let mut conflicts = Vec::new();

    for name in names {
        let b = base.and_then(|r| r.get(name));
        let l = local.get(name);
        let r = remote.get(name);

        let value = if l == r || r == b {
            l
        } else if l == b {
            r
        } else {
            conflicts.push(FieldConflict {
                key: key.clone(),
                field: name.to_owned(),
                base: b.map(str::to_owned),
                local: l.map(str::to_owned),
                remote: r.map(str::to_owned),
            });
            l
        };
        if let Some(value) = value {
            merged.set(name, value);
        }
    }
    (merged, conflicts)
}
