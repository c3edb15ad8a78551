//! Carrying remote changes to other files into a merge commit.
//!
//! The bibliography is merged record by record; every other path is compared
//! as a whole blob across base, local and remote. A path changed on the
//! remote only is carried into the merge tree, a path changed on the local
//! side only is kept, and a path changed differently on both sides fails the
//! attempt before anything is written.

use std::collections::BTreeMap;
use std::path::Path;

use bibsync_git::{EntryMode, GitError, GitOid, GitRepo, TreeEdit};

use crate::error::SyncError;

/// `path → (mode, oid)` for every non-tree entry reachable from a tree.
pub type FlatTree = BTreeMap<String, (EntryMode, GitOid)>;

/// Flatten `tree` recursively.
///
/// # Errors
/// Any failure reading a tree object.
pub fn flatten<R: GitRepo + ?Sized>(repo: &R, tree: GitOid) -> Result<FlatTree, GitError> {
    let mut out = FlatTree::new();
    flatten_into(repo, tree, "", &mut out)?;
    Ok(out)
}

fn flatten_into<R: GitRepo + ?Sized>(
    repo: &R,
    tree: GitOid,
    prefix: &str,
    out: &mut FlatTree,
) -> Result<(), GitError> {
    for entry in repo.read_tree(tree)? {
        let path = if prefix.is_empty() {
            entry.name
        } else {
            format!("{prefix}/{}", entry.name)
        };
        if entry.mode == EntryMode::Tree {
            flatten_into(repo, entry.oid, &path, out)?;
        } else {
            out.insert(path, (entry.mode, entry.oid));
        }
    }
    Ok(())
}

/// Remote-side changes to apply on top of the local tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CarryPlan {
    edits: Vec<TreeEdit>,
}

impl CarryPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Tree edits, in path order.
    #[must_use]
    pub fn edits(&self) -> &[TreeEdit] {
        &self.edits
    }

    /// Paths the plan touches.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.edits.iter().map(|e| match e {
            TreeEdit::Upsert { path, .. } | TreeEdit::Remove { path } => path.as_str(),
        })
    }
}

/// Three-way compare every path except `exclude`.
///
/// # Errors
/// [`SyncError::UnrelatedPathConflict`] listing every path changed
/// differently on both sides.
pub fn plan(
    base: &FlatTree,
    local: &FlatTree,
    remote: &FlatTree,
    exclude: &str,
) -> Result<CarryPlan, SyncError> {
    let mut paths: Vec<&String> = base.keys().chain(local.keys()).chain(remote.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut edits = Vec::new();
    let mut conflicts = Vec::new();
    for path in paths.into_iter().filter(|p| p.as_str() != exclude) {
        let (b, l, r) = (base.get(path), local.get(path), remote.get(path));
        if l == r || b == r {
            continue;
        }
        if b != l {
            conflicts.push(path.clone());
            continue;
        }
        edits.push(match r {
            Some(&(mode, oid)) => TreeEdit::Upsert {
                path: path.clone(),
                mode,
                oid,
            },
            None => TreeEdit::Remove { path: path.clone() },
        });
    }

    if !conflicts.is_empty() {
        return Err(SyncError::UnrelatedPathConflict { paths: conflicts });
    }
    Ok(CarryPlan { edits })
}

/// Fail if any path the plan will overwrite differs in the working tree from
/// the local head.
///
/// # Errors
/// [`SyncError::DirtyWorkingCopy`] listing the modified paths.
pub fn ensure_clean<R: GitRepo + ?Sized>(
    repo: &R,
    workdir: &Path,
    local: &FlatTree,
    plan: &CarryPlan,
) -> Result<(), SyncError> {
    let mut dirty = Vec::new();
    for path in plan.paths() {
        let on_disk = match std::fs::read(workdir.join(path)) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let committed = match local.get(path) {
            Some(&(mode, oid)) if mode.is_blob() => Some(repo.read_blob(oid)?),
            _ => None,
        };
        if on_disk != committed {
            dirty.push(path.to_owned());
        }
    }
    if dirty.is_empty() {
        Ok(())
    } else {
        Err(SyncError::DirtyWorkingCopy { paths: dirty })
    }
}

/// Mirror the plan into the working tree.
///
/// # Errors
/// I/O failures, or git failures reading carried blobs.
pub fn apply_to_workdir<R: GitRepo + ?Sized>(
    repo: &R,
    workdir: &Path,
    plan: &CarryPlan,
) -> Result<(), SyncError> {
    for edit in plan.edits() {
        match edit {
            TreeEdit::Upsert { path, mode, oid } if mode.is_blob() => {
                let bytes = repo.read_blob(*oid)?;
                super::write_atomic(&workdir.join(path), &bytes, *mode == EntryMode::BlobExecutable)?;
            }
            TreeEdit::Upsert { path, mode, .. } => {
                tracing::warn!(path, ?mode, "not materializing non-file entry in working tree");
            }
            TreeEdit::Remove { path } => match std::fs::remove_file(workdir.join(path)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
    }
    Ok(())
}
