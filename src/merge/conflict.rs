//! Structured conflict model.
//!
//! A [`RecordConflict`] is what the differ hands to a resolver when it cannot
//! pick a record on its own. It carries all three versions, the auto-merged
//! record for the fields that did merge, and one [`FieldConflict`] per field
//! that did not.
//!
//! # Serialization
//!
//! Tagged JSON so external tools can consume a conflict dump:
//!
//! ```json
//! {
//!   "key": "smith2020",
//!   "kind": { "type": "both_modified" },
//!   "fields": [
//!     { "key": "smith2020", "field": "author", "base": "X", "local": "X-local", "remote": "X-remote" }
//!   ],
//!   ...
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordKey};

/// Which side of the merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Why a record could not be merged automatically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides edited the same field of an existing record differently.
    BothModified,
    /// Both sides added a record under the same key with clashing fields.
    AddAdd,
    /// One side deleted the record, the other edited it.
    ModifyDelete {
        /// The side that deleted the record.
        deleted_on: Side,
    },
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothModified => write!(f, "both sides modified"),
            Self::AddAdd => write!(f, "added on both sides"),
            Self::ModifyDelete { deleted_on } => {
                write!(f, "deleted on {deleted_on}, edited on the other side")
            }
        }
    }
}

/// One field that base, local and remote disagree on.
///
/// `None` means the field is absent on that side; `Some("")` is an empty
/// value. `local != remote` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub key: RecordKey,
    pub field: String,
    pub base: Option<String>,
    pub local: Option<String>,
    pub remote: Option<String>,
}

impl FieldConflict {
    /// The value `side` wants for this field.
    #[must_use]
    pub fn value_on(&self, side: Side) -> Option<&str> {
        match side {
            Side::Local => self.local.as_deref(),
            Side::Remote => self.remote.as_deref(),
        }
    }
}

/// A record the differ could not merge silently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConflict {
    pub key: RecordKey,
    pub kind: ConflictKind,
    /// Absent when the record is new on both sides.
    pub base: Option<Record>,
    /// Absent when local deleted the record.
    pub local: Option<Record>,
    /// Absent when remote deleted the record.
    pub remote: Option<Record>,
    /// Every non-conflicting field already merged. Conflicting fields hold
    /// the local value when local has one.
    pub merged: Record,
    /// Conflicting fields, in merged field order. Never empty.
    pub fields: Vec<FieldConflict>,
}

impl RecordConflict {
    /// Build the record `side` would end up with: the auto-merged fields plus
    /// that side's value for every conflicting field. Returns `None` when
    /// `side` deleted the record.
    #[must_use]
    pub fn take_side(&self, side: Side) -> Option<Record> {
        if let ConflictKind::ModifyDelete { deleted_on } = self.kind
            && deleted_on == side
        {
            return None;
        }
        let mut record = self.merged.clone();
        for field in &self.fields {
            match field.value_on(side) {
                Some(value) => record.set(&field.field, value),
                None => {
                    record.remove(&field.field);
                }
            }
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> RecordKey {
        RecordKey::new(s).unwrap()
    }

    fn author_conflict() -> RecordConflict {
        let base = Record::new(Some(key("a"))).with_field("author", "X");
        let local = Record::new(Some(key("a")))
            .with_field("author", "X-local")
            .with_field("year", "2020");
        let remote = Record::new(Some(key("a"))).with_field("author", "X-remote");
        RecordConflict {
            key: key("a"),
            kind: ConflictKind::BothModified,
            merged: local.clone(),
            base: Some(base),
            local: Some(local),
            remote: Some(remote),
            fields: vec![FieldConflict {
                key: key("a"),
                field: "author".into(),
                base: Some("X".into()),
                local: Some("X-local".into()),
                remote: Some("X-remote".into()),
            }],
        }
    }

    #[test]
    fn take_side_keeps_merged_fields() {
        let c = author_conflict();
        let remote = c.take_side(Side::Remote).unwrap();
        assert_eq!(remote.get("author"), Some("X-remote"));
        assert_eq!(remote.get("year"), Some("2020"));
        let local = c.take_side(Side::Local).unwrap();
        assert_eq!(local.get("author"), Some("X-local"));
    }

    #[test]
    fn take_side_honours_deletion() {
        let mut c = author_conflict();
        c.kind = ConflictKind::ModifyDelete {
            deleted_on: Side::Remote,
        };
        assert!(c.take_side(Side::Remote).is_none());
        assert!(c.take_side(Side::Local).is_some());
    }

    #[test]
    fn take_side_removes_absent_field() {
        let mut c = author_conflict();
        c.fields[0].remote = None;
        let remote = c.take_side(Side::Remote).unwrap();
        assert!(!remote.contains("author"));
    }

    #[test]
    fn serde_tagged_json() {
        let c = author_conflict();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["kind"]["type"], "both_modified");
        assert_eq!(json["fields"][0]["remote"], "X-remote");

        let md = ConflictKind::ModifyDelete {
            deleted_on: Side::Local,
        };
        let json = serde_json::to_string(&md).unwrap();
        assert_eq!(json, r#"{"type":"modify_delete","deleted_on":"local"}"#);
        let back: ConflictKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, md);
    }

    #[test]
    fn serde_roundtrip_record_conflict() {
        let c = author_conflict();
        let json = serde_json::to_string_pretty(&c).unwrap();
        let back: RecordConflict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn kind_display() {
        assert_eq!(ConflictKind::AddAdd.to_string(), "added on both sides");
        assert_eq!(
            ConflictKind::ModifyDelete {
                deleted_on: Side::Local
            }
            .to_string(),
            "deleted on local, edited on the other side"
        );
    }
}
