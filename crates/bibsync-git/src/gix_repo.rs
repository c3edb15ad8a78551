//! The gix-backed implementation of [`GitRepo`].

use std::path::{Path, PathBuf};

use crate::error::GitError;
use crate::repo::GitRepo;
use crate::types::{CommitInfo, FetchOutcome, GitOid, PushOutcome, RefName, TreeEdit, TreeEntry};

/// A [`GitRepo`] implementation backed by [gix](https://github.com/GitoxideLabs/gitoxide).
///
/// Construct via [`GixRepo::open`] or [`GixRepo::open_at`].
pub struct GixRepo {
    pub(crate) repo: gix::Repository,
    pub(crate) workdir: Option<PathBuf>,
    pub(crate) git_dir: PathBuf,
}

impl GixRepo {
    /// Open the git repository at or above `path`.
    ///
    /// # Errors
    /// Returns [`GitError::BackendError`] if no repository is found.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = gix::discover(path).map_err(|e| GitError::BackendError {
            message: format!("no git repository at or above {}: {e}", path.display()),
        })?;
        Ok(Self::from_repo(repo))
    }

    /// Open a git repository at exactly `path` (no parent discovery).
    ///
    /// # Errors
    /// Returns [`GitError::BackendError`] if `path` is not a repository.
    pub fn open_at(path: &Path) -> Result<Self, GitError> {
        let repo = gix::open(path).map_err(|e| GitError::BackendError {
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(Self::from_repo(repo))
    }

    fn from_repo(repo: gix::Repository) -> Self {
        let workdir = repo.workdir().map(Path::to_path_buf);
        let git_dir = repo.git_dir().to_path_buf();
        Self {
            repo,
            workdir,
            git_dir,
        }
    }

    /// Directory git CLI subprocesses run in.
    pub(crate) fn command_dir(&self) -> &Path {
        self.workdir.as_deref().unwrap_or(&self.git_dir)
    }
}

/// Convert our `GitOid` to a `gix::ObjectId`.
pub(crate) fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

/// Convert a `gix::oid` to our `GitOid`.
pub(crate) fn from_gix_oid(oid: &gix::oid) -> GitOid {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(oid.as_bytes());
    GitOid::from_bytes(bytes)
}

impl GitRepo for GixRepo {
    // === Refs ===
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError> {
        crate::refs_impl::read_ref(self, name)
    }

    fn write_ref(
        &self,
        name: &RefName,
        oid: GitOid,
        expected: Option<GitOid>,
        log_message: &str,
    ) -> Result<(), GitError> {
        crate::refs_impl::write_ref(self, name, oid, expected, log_message)
    }

    // === Object read ===
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        crate::objects_impl::read_blob(self, oid)
    }

    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
        crate::objects_impl::read_tree(self, oid)
    }

    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        crate::objects_impl::read_commit(self, oid)
    }

    // === Object write ===
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        crate::objects_impl::write_blob(self, data)
    }

    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError> {
        crate::objects_impl::edit_tree(self, base, edits)
    }

    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
        update_ref: Option<&RefName>,
    ) -> Result<GitOid, GitError> {
        crate::objects_impl::create_commit(self, tree, parents, message, update_ref)
    }

    // === Index ===
    fn reset_index(&self, tree: GitOid) -> Result<(), GitError> {
        crate::index_impl::reset_index(self, tree)
    }

    // === Ancestry ===
    fn is_ancestor(&self, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError> {
        crate::refs_impl::is_ancestor(self, ancestor, descendant)
    }

    fn merge_base(&self, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError> {
        crate::refs_impl::merge_base(self, a, b)
    }

    // === Transport ===
    fn fetch(&self, remote: &str, branch: &str) -> Result<FetchOutcome, GitError> {
        crate::transport_impl::fetch(self, remote, branch)
    }

    fn push_branch(
        &self,
        remote: &str,
        local_ref: &str,
        remote_ref: &str,
    ) -> Result<PushOutcome, GitError> {
        crate::transport_impl::push_branch(self, remote, local_ref, remote_ref)
    }

    // === Layout ===
    fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}
