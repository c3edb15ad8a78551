//! Index (staging area) operations for [`GixRepo`].

use crate::error::GitError;
use crate::gix_repo::{GixRepo, to_gix_oid};
use crate::types::GitOid;

/// Replace the index with the entries of `tree`, leaving the working tree
/// alone. Equivalent to `git read-tree <tree>`.
///
/// Stat data is not carried over, so git re-hashes the affected files on the
/// next `git status`; content is what matters here.
pub fn reset_index(repo: &GixRepo, tree: GitOid) -> Result<(), GitError> {
    let state = gix::index::State::from_tree(&to_gix_oid(tree), &repo.repo.objects, Default::default())
        .map_err(|e| GitError::BackendError {
            message: format!("failed to create index from tree {tree}: {e}"),
        })?;

    let mut index = gix::index::File::from_state(state, repo.repo.index_path());
    index
        .write(Default::default())
        .map_err(|e| GitError::BackendError {
            message: format!("failed to write index: {e}"),
        })?;

    Ok(())
}
