//! A competing push between fetch and push must surface as a push race.
//!
//! [`RacingRepo`] wraps a real repository and lets bob publish a commit just
//! before alice's push reaches the remote.

mod common;

use std::cell::RefCell;
use std::path::Path;

use bibsync::config::BibsyncConfig;
use bibsync::merge::Abandon;
use bibsync::{SyncEngine, SyncError, SyncPhase};
use bibsync_git::{
    CommitInfo, FetchOutcome, GitError, GitOid, GitRepo, GixRepo, PushOutcome, RefName, TreeEdit,
    TreeEntry,
};
use common::*;

struct RacingRepo {
    inner: GixRepo,
    before_push: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl GitRepo for RacingRepo {
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError> {
        self.inner.read_ref(name)
    }
    fn write_ref(
        &self,
        name: &RefName,
        oid: GitOid,
        expected: Option<GitOid>,
        log_message: &str,
    ) -> Result<(), GitError> {
        self.inner.write_ref(name, oid, expected, log_message)
    }
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        self.inner.read_blob(oid)
    }
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
        self.inner.read_tree(oid)
    }
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        self.inner.read_commit(oid)
    }
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        self.inner.write_blob(data)
    }
    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError> {
        self.inner.edit_tree(base, edits)
    }
    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
        update_ref: Option<&RefName>,
    ) -> Result<GitOid, GitError> {
        self.inner.create_commit(tree, parents, message, update_ref)
    }
    fn reset_index(&self, tree: GitOid) -> Result<(), GitError> {
        self.inner.reset_index(tree)
    }
    fn is_ancestor(&self, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError> {
        self.inner.is_ancestor(ancestor, descendant)
    }
    fn merge_base(&self, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError> {
        self.inner.merge_base(a, b)
    }
    fn fetch(&self, remote: &str, branch: &str) -> Result<FetchOutcome, GitError> {
        self.inner.fetch(remote, branch)
    }
    fn push_branch(
        &self,
        remote: &str,
        local_ref: &str,
        remote_ref: &str,
    ) -> Result<PushOutcome, GitError> {
        if let Some(race) = self.before_push.borrow_mut().take() {
            race();
        }
        self.inner.push_branch(remote, local_ref, remote_ref)
    }
    fn workdir(&self) -> Option<&Path> {
        self.inner.workdir()
    }
    fn git_dir(&self) -> &Path {
        self.inner.git_dir()
    }
}

fn racing_engine(dir: &Path, race: impl FnOnce() + 'static) -> SyncEngine<RacingRepo> {
    let repo = RacingRepo {
        inner: GixRepo::open(dir).unwrap(),
        before_push: RefCell::new(Some(Box::new(race))),
    };
    SyncEngine::new(repo, BibsyncConfig::default()).unwrap()
}

#[test]
fn competing_push_is_reported_as_push_race() {
    let fx = setup();
    write(fx.alice(), BIB, &with_author("X2"));

    let bob = fx.bob().to_path_buf();
    let engine = racing_engine(fx.alice(), move || {
        write(&bob, BIB, &with_title("Raced"));
        publish(&bob, "bob got there first");
    });

    let result = engine.sync(BIB, &mut Abandon);
    assert!(!result.success());
    assert_eq!(result.phase(), SyncPhase::Failed);
    let err = result.error().unwrap();
    assert!(matches!(err, SyncError::PushRace { .. }), "{err:?}");
    assert!(err.is_retryable());

    // alice's commit exists locally; the remote has bob's commit
    let local = head(fx.alice());
    assert_eq!(result.commit().unwrap().to_string(), local);
    assert_eq!(fx.remote_head(), head(fx.bob()));
    assert_ne!(fx.remote_head(), local);

    // re-running the whole sync picks up bob's commit and succeeds
    let retry = engine_with(fx.alice(), BibsyncConfig::default()).sync(BIB, &mut Abandon);
    assert!(retry.success(), "{:?}", retry.error());
    let merged = retry.merged().unwrap();
    assert_eq!(merged.get(&key("a")).unwrap().get("author"), Some("X2"));
    assert_eq!(merged.get(&key("b")).unwrap().get("title"), Some("Raced"));
    assert_eq!(fx.remote_head(), head(fx.alice()));
}
