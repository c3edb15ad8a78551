//! Conflict resolution strategies.
//!
//! A resolver receives every unresolved [`RecordConflict`] of one attempt
//! plus the full remote collection for context, and either returns resolved
//! records or `None` to abandon. It is called at most once per attempt and
//! may block (e.g. on a human); there is no timeout.
//!
//! The returned collection is spliced by
//! [`RecordDiff::apply_resolution`](super::RecordDiff::apply_resolution):
//! one record per conflicted key, or no record to accept a deletion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::RecordCollection;

use super::conflict::{RecordConflict, Side};

/// Pluggable conflict resolution.
pub trait ConflictResolver {
    fn resolve(
        &mut self,
        conflicts: &[RecordConflict],
        remote: &RecordCollection,
    ) -> Option<RecordCollection>;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&[RecordConflict], &RecordCollection) -> Option<RecordCollection>,
{
    fn resolve(
        &mut self,
        conflicts: &[RecordConflict],
        remote: &RecordCollection,
    ) -> Option<RecordCollection> {
        self(conflicts, remote)
    }
}

/// Always gives up.
#[derive(Clone, Copy, Debug, Default)]
pub struct Abandon;

impl ConflictResolver for Abandon {
    fn resolve(&mut self, _: &[RecordConflict], _: &RecordCollection) -> Option<RecordCollection> {
        None
    }
}

/// Takes one side's value for every conflicting field. For modify/delete
/// conflicts the preferred side's presence or deletion wins.
#[derive(Clone, Copy, Debug)]
pub struct Prefer(pub Side);

impl ConflictResolver for Prefer {
    fn resolve(
        &mut self,
        conflicts: &[RecordConflict],
        _: &RecordCollection,
    ) -> Option<RecordCollection> {
        let mut out = RecordCollection::new();
        for record in conflicts.iter().filter_map(|c| c.take_side(self.0)) {
            out.push_or_replace(record);
        }
        Some(out)
    }
}

/// Built-in strategies selectable by name (`abandon`, `local`, `remote`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Abandon,
    PreferLocal,
    PreferRemote,
}

impl Strategy {
    /// A boxed resolver implementing this strategy.
    #[must_use]
    pub fn resolver(self) -> Box<dyn ConflictResolver> {
        match self {
            Self::Abandon => Box::new(Abandon),
            Self::PreferLocal => Box::new(Prefer(Side::Local)),
            Self::PreferRemote => Box::new(Prefer(Side::Remote)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abandon => write!(f, "abandon"),
            Self::PreferLocal => write!(f, "local"),
            Self::PreferRemote => write!(f, "remote"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abandon" => Ok(Self::Abandon),
            "local" | "prefer-local" => Ok(Self::PreferLocal),
            "remote" | "prefer-remote" => Ok(Self::PreferRemote),
            other => Err(format!(
                "unknown strategy `{other}` (expected abandon, local or remote)"
            )),
        }
    }
}
