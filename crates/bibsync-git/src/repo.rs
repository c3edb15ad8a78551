//! The [`GitRepo`] trait: the single abstraction boundary between bibsync and git.
//!
//! The sync engine interacts with git exclusively through this trait. The
//! trait is object-safe so callers can use `dyn GitRepo` or `Box<dyn GitRepo>`.
//!
//! | Group        | Methods                                          |
//! |-------------|--------------------------------------------------|
//! | Refs         | `read_ref`, `write_ref`                          |
//! | Object read  | `read_blob`, `read_tree`, `read_commit`          |
//! | Object write | `write_blob`, `edit_tree`, `create_commit`       |
//! | Index        | `reset_index`                                    |
//! | Ancestry     | `is_ancestor`, `merge_base`                      |
//! | Transport    | `fetch`, `push_branch`                           |

use std::path::Path;

use crate::error::GitError;
use crate::types::{CommitInfo, FetchOutcome, GitOid, PushOutcome, RefName, TreeEdit, TreeEntry};

/// The git abstraction trait used by the sync engine.
///
/// Implementations may be backed by gix (the shipped backend) or a test
/// double.
///
/// # Object safety
///
/// This trait is object-safe: no generic methods, no `Self` in return position
/// outside of `Result`. Callers may use `&dyn GitRepo` or `Box<dyn GitRepo>`.
pub trait GitRepo {
    // -----------------------------------------------------------------------
    // Refs
    // -----------------------------------------------------------------------

    /// Resolve a ref to its OID, returning `None` if the ref does not exist.
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError>;

    /// Point a ref at `oid`.
    ///
    /// With `expected: Some(old)` the ref must currently point at `old`;
    /// otherwise [`GitError::RefConflict`] is returned and the ref is left
    /// untouched. `None` creates or overwrites unconditionally.
    /// `log_message` is written to the reflog entry.
    fn write_ref(
        &self,
        name: &RefName,
        oid: GitOid,
        expected: Option<GitOid>,
        log_message: &str,
    ) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Object read
    // -----------------------------------------------------------------------

    /// Read the contents of a blob object.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Read the entries of a tree object (one level deep, not recursive).
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Read a commit object's metadata.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    // -----------------------------------------------------------------------
    // Object write
    // -----------------------------------------------------------------------

    /// Write a blob to the object store and return its OID.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Apply a set of edits to an existing tree and return the OID of the new tree.
    ///
    /// Edits may address nested paths like `"refs/papers.bib"`; intermediate
    /// trees are created or updated as needed.
    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError>;

    /// Create a commit object and optionally update a ref to point to it.
    ///
    /// When `update_ref` is `Some`, the ref must currently point at the first
    /// parent; otherwise [`GitError::RefConflict`] is returned and the ref is
    /// left untouched.
    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
        update_ref: Option<&RefName>,
    ) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Index
    // -----------------------------------------------------------------------

    /// Replace the index with the contents of `tree` without touching the
    /// working tree (`git read-tree <tree>`).
    fn reset_index(&self, tree: GitOid) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Ancestry
    // -----------------------------------------------------------------------

    /// Check if `ancestor` is reachable from `descendant` following parent links.
    fn is_ancestor(&self, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError>;

    /// Find the best common ancestor (merge base) of two commits.
    ///
    /// Returns `None` if the commits have no common ancestor.
    fn merge_base(&self, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError>;

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Fetch `branch` from `remote` into `refs/remotes/<remote>/<branch>`.
    ///
    /// A remote that does not have the branch yet is reported as
    /// [`FetchOutcome::RemoteBranchMissing`], not as an error.
    fn fetch(&self, remote: &str, branch: &str) -> Result<FetchOutcome, GitError>;

    /// Push `local_ref` to `remote_ref` on `remote` without forcing.
    ///
    /// A rejection because the remote branch moved is
    /// [`GitError::PushRejected`]. A refusal by the remote for any other
    /// reason (hooks, protected branches) is [`GitError::PushRefused`]. Any
    /// other failure is [`GitError::Transport`].
    fn push_branch(
        &self,
        remote: &str,
        local_ref: &str,
        remote_ref: &str,
    ) -> Result<PushOutcome, GitError>;

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    /// The working directory, or `None` for bare repositories.
    fn workdir(&self) -> Option<&Path>;

    /// The `.git` directory.
    fn git_dir(&self) -> &Path;
}
