//! Reading file contents at a commit.
//!
//! Commit contents are immutable, so everything read is cached for the
//! lifetime of the reader without invalidation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use bibsync_git::{GitError, GitOid, GitRepo};

use crate::error::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    /// The path does not exist (or is not a file) at that commit.
    #[error("{path} does not exist at {}", .rev.short())]
    NotFound { rev: GitOid, path: String },

    /// Any other failure talking to the repository.
    #[error(transparent)]
    Git(#[from] GitError),
}

impl From<RevisionError> for SyncError {
    fn from(err: RevisionError) -> Self {
        match err {
            e @ RevisionError::NotFound { .. } => Self::NotFound(e.to_string()),
            RevisionError::Git(e) => e.into(),
        }
    }
}

/// Side-effect-free, caching file reader over a [`GitRepo`].
#[derive(Debug, Default)]
pub struct RevisionReader {
    cache: RefCell<HashMap<(GitOid, String), Option<Arc<[u8]>>>>,
}

impl RevisionReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of `path` (slash-separated, relative to the tree root) as of
    /// commit `rev`.
    ///
    /// # Errors
    /// [`RevisionError::NotFound`] if the path is absent at that commit,
    /// [`RevisionError::Git`] for anything else.
    pub fn read_file<R: GitRepo + ?Sized>(
        &self,
        repo: &R,
        rev: GitOid,
        path: &str,
    ) -> Result<Arc<[u8]>, RevisionError> {
        self.read_file_opt(repo, rev, path)?
            .ok_or_else(|| RevisionError::NotFound {
                rev,
                path: path.to_owned(),
            })
    }

    /// Like [`read_file`](Self::read_file) but a missing path is `Ok(None)`.
    ///
    /// # Errors
    /// [`RevisionError::Git`] if the commit or one of its trees cannot be read.
    pub fn read_file_opt<R: GitRepo + ?Sized>(
        &self,
        repo: &R,
        rev: GitOid,
        path: &str,
    ) -> Result<Option<Arc<[u8]>>, RevisionError> {
        let key = (rev, path.to_owned());
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Ok(hit.clone());
        }

        let bytes = lookup(repo, rev, path)?.map(Arc::from);
        tracing::trace!(
            rev = %rev.short(),
            path,
            found = bytes.is_some(),
            "read file at revision"
        );
        self.cache.borrow_mut().insert(key, bytes.clone());
        Ok(bytes)
    }

    /// Number of cached `(commit, path)` lookups.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

fn lookup<R: GitRepo + ?Sized>(
    repo: &R,
    rev: GitOid,
    path: &str,
) -> Result<Option<Vec<u8>>, GitError> {
    let mut tree = repo.read_commit(rev)?.tree_oid;
    let mut parts = path.split('/').filter(|p| !p.is_empty()).peekable();

    while let Some(part) = parts.next() {
        let Some(entry) = repo.read_tree(tree)?.into_iter().find(|e| e.name == part) else {
            return Ok(None);
        };
        if parts.peek().is_none() {
            return if entry.mode.is_blob() {
                repo.read_blob(entry.oid).map(Some)
            } else {
                Ok(None)
            };
        }
        if entry.mode != bibsync_git::EntryMode::Tree {
            return Ok(None);
        }
        tree = entry.oid;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;

    use bibsync_git::GixRepo;

    use super::*;

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_owned()
    }

    fn repo_with_files() -> (tempfile::TempDir, GixRepo, GitOid) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "-q", "-b", "main"]);
        git(root, &["config", "user.name", "Test"]);
        git(root, &["config", "user.email", "test@example.com"]);
        std::fs::write(root.join("refs.bib"), "@misc{a,\n  title = {T},\n}\n").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub/nested.bib"), "nested").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "init"]);
        let head: GitOid = git(root, &["rev-parse", "HEAD"]).parse().unwrap();
        let repo = GixRepo::open(root).unwrap();
        (dir, repo, head)
    }

    #[test]
    fn reads_top_level_and_nested_files() {
        let (_dir, repo, head) = repo_with_files();
        let reader = RevisionReader::new();
        assert_eq!(
            &*reader.read_file(&repo, head, "refs.bib").unwrap(),
            b"@misc{a,\n  title = {T},\n}\n"
        );
        assert_eq!(&*reader.read_file(&repo, head, "sub/nested.bib").unwrap(), b"nested");
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, repo, head) = repo_with_files();
        let reader = RevisionReader::new();
        let err = reader.read_file(&repo, head, "missing.bib").unwrap_err();
        assert!(matches!(err, RevisionError::NotFound { ref path, .. } if path == "missing.bib"));
        assert!(reader.read_file_opt(&repo, head, "sub/missing.bib").unwrap().is_none());
        // a directory is not a file
        assert!(reader.read_file_opt(&repo, head, "sub").unwrap().is_none());
        // a file is not a directory
        assert!(reader.read_file_opt(&repo, head, "refs.bib/x").unwrap().is_none());

        let sync: SyncError = err.into();
        assert!(matches!(sync, SyncError::NotFound(_)));
    }

    #[test]
    fn unknown_commit_is_a_git_error() {
        let (_dir, repo, _) = repo_with_files();
        let reader = RevisionReader::new();
        let bogus: GitOid = "1111111111111111111111111111111111111111".parse().unwrap();
        let err = reader.read_file(&repo, bogus, "refs.bib").unwrap_err();
        assert!(matches!(err, RevisionError::Git(_)));
        assert_eq!(reader.cached(), 0);
    }

    #[test]
    fn results_are_cached_including_misses() {
        let (_dir, repo, head) = repo_with_files();
        let reader = RevisionReader::new();
        let first = reader.read_file(&repo, head, "refs.bib").unwrap();
        let again = reader.read_file(&repo, head, "refs.bib").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        reader.read_file_opt(&repo, head, "missing.bib").unwrap();
        reader.read_file_opt(&repo, head, "missing.bib").unwrap();
        assert_eq!(reader.cached(), 2);
    }
}
