//! gix-backed ref and ancestry operations.

use gix::refs::Target;
use gix::refs::transaction::PreviousValue;

use crate::error::GitError;
use crate::gix_repo::{GixRepo, from_gix_oid, to_gix_oid};
use crate::types::{GitOid, RefName};

fn backend(e: impl std::fmt::Display) -> GitError {
    GitError::BackendError {
        message: e.to_string(),
    }
}

pub fn read_ref(repo: &GixRepo, name: &RefName) -> Result<Option<GitOid>, GitError> {
    match repo.repo.try_find_reference(name.as_str()) {
        Ok(Some(mut r)) => {
            let id = r.peel_to_id_in_place().map_err(backend)?;
            Ok(Some(from_gix_oid(id.as_ref())))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(backend(e)),
    }
}

pub fn write_ref(
    repo: &GixRepo,
    name: &RefName,
    oid: GitOid,
    expected: Option<GitOid>,
    log_message: &str,
) -> Result<(), GitError> {
    let previous = expected.map_or(PreviousValue::Any, |old| {
        PreviousValue::MustExistAndMatch(Target::Object(to_gix_oid(old)))
    });
    repo.repo
        .reference(name.as_str(), to_gix_oid(oid), previous, log_message)
        .map_err(|e| {
            let msg = e.to_string();
            if expected.is_some() && (msg.contains("match") || msg.contains("exist")) {
                GitError::RefConflict {
                    ref_name: name.to_string(),
                    message: msg,
                }
            } else {
                backend(msg)
            }
        })?;
    Ok(())
}

pub fn is_ancestor(
    repo: &GixRepo,
    ancestor: GitOid,
    descendant: GitOid,
) -> Result<bool, GitError> {
    if ancestor == descendant {
        return Ok(true);
    }

    let target = to_gix_oid(ancestor);
    let walk = repo
        .repo
        .rev_walk([to_gix_oid(descendant)])
        .all()
        .map_err(backend)?;

    for info in walk {
        if info.map_err(backend)?.id == target {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn merge_base(repo: &GixRepo, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError> {
    match repo.repo.merge_base(to_gix_oid(a), to_gix_oid(b)) {
        Ok(id) => Ok(Some(from_gix_oid(id.as_ref()))),
        Err(gix::repository::merge_base::Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(backend(e)),
    }
}
