//! The sync orchestrator.
//!
//! [`SyncEngine`] drives one bibliography file through
//! fetch → diff → (resolve) → write → commit → push, as tracked by
//! [`SyncPhase`]. Every attempt returns a [`MergeResult`]; failures are typed
//! [`SyncError`]s and never partial merges.
//!
//! Nothing in the working tree or on the branch changes before the merge
//! decision is final. Cancellation is honoured up to (not including)
//! [`SyncPhase::Committed`].
//!
//! The engine does no locking of its own; callers serialize attempts per
//! file (the CLI holds a lock file for this).

pub mod carry;
mod phase;

pub use phase::SyncPhase;

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bibsync_git::{FetchOutcome, GitOid, GitRepo, PushOutcome, RefName, TreeEdit};

use crate::codec::{BibtexCodec, RecordCodec};
use crate::config::BibsyncConfig;
use crate::error::SyncError;
use crate::merge::{self, ConflictResolver, MergeResult, RecordConflict};
use crate::record::RecordCollection;
use crate::revision::RevisionReader;

use phase::PhaseTracker;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag, shareable across threads.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Attempt bookkeeping
// ---------------------------------------------------------------------------

/// Mutable state of one attempt, turned into a [`MergeResult`] at the end.
struct Attempt {
    tracker: PhaseTracker,
    notes: Vec<String>,
    conflicts: Vec<RecordConflict>,
    commit: Option<GitOid>,
}

impl Attempt {
    const fn new() -> Self {
        Self {
            tracker: PhaseTracker::new(),
            notes: Vec::new(),
            conflicts: Vec::new(),
            commit: None,
        }
    }

    fn advance(&mut self, next: SyncPhase) -> Result<(), SyncError> {
        self.tracker.advance(next)
    }

    fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        tracing::info!(%note, "sync note");
        self.notes.push(note);
    }

    fn finish(mut self, outcome: Result<RecordCollection, SyncError>) -> MergeResult {
        match outcome {
            Ok(merged) => MergeResult::succeeded(merged, self.commit, self.notes),
            Err(err) => {
                let phase = self.tracker.phase();
                self.tracker.fail();
                tracing::warn!(%phase, error = %err, "sync failed");
                MergeResult::failed(err, self.conflicts, self.commit, self.notes)
            }
        }
    }
}

/// The three decoded versions of the file, plus what the commit stage needs.
struct Versions {
    base_commit: Option<GitOid>,
    base: RecordCollection,
    local: RecordCollection,
    remote: RecordCollection,
    local_head_bytes: Option<Arc<[u8]>>,
    remote_bytes: Option<Arc<[u8]>>,
}

/// Branch heads after fetching.
#[derive(Clone, Copy, Debug)]
struct Heads {
    local: GitOid,
    /// Equal to `local` when the remote has no such branch yet.
    remote: GitOid,
    remote_missing: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    FetchOnly,
    Sync,
}

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

/// Semantic sync of bibliography files over a [`GitRepo`].
pub struct SyncEngine<R: GitRepo> {
    repo: R,
    codec: BibtexCodec,
    config: BibsyncConfig,
    reader: RevisionReader,
    branch: RefName,
    cancel: Option<CancelToken>,
}

impl<R: GitRepo> SyncEngine<R> {
    /// Create an engine for `repo`.
    ///
    /// # Errors
    /// [`SyncError::Config`] if the configured branch or remote is not a
    /// usable ref component.
    pub fn new(repo: R, config: BibsyncConfig) -> Result<Self, SyncError> {
        let branch = RefName::branch(&config.repo.branch)
            .map_err(|e| SyncError::Config(format!("repo.branch: {e}")))?;
        RefName::remote_tracking(&config.repo.remote, &config.repo.branch)
            .map_err(|e| SyncError::Config(format!("repo.remote: {e}")))?;
        Ok(Self {
            codec: BibtexCodec::new(config.sync.identity.clone()),
            repo,
            config,
            reader: RevisionReader::new(),
            branch,
            cancel: None,
        })
    }

    /// Check `token` between phases until the attempt commits.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub const fn repo(&self) -> &R {
        &self.repo
    }

    pub const fn config(&self) -> &BibsyncConfig {
        &self.config
    }

    /// Fetch, merge and commit `path` without pushing.
    #[tracing::instrument(skip(self, resolver), fields(branch = %self.config.repo.branch))]
    pub fn fetch_and_merge(
        &self,
        path: &str,
        resolver: &mut dyn ConflictResolver,
    ) -> MergeResult {
        let mut attempt = Attempt::new();
        let outcome = self.run_merge(path, resolver, Mode::FetchOnly, &mut attempt);
        attempt.finish(outcome)
    }

    /// Fetch, merge, commit and (unless `sync.push = false`) push `path`.
    #[tracing::instrument(skip(self, resolver), fields(branch = %self.config.repo.branch))]
    pub fn sync(&self, path: &str, resolver: &mut dyn ConflictResolver) -> MergeResult {
        let mut attempt = Attempt::new();
        let outcome = self.run_merge(path, resolver, Mode::Sync, &mut attempt);
        attempt.finish(outcome)
    }

    /// Push the local branch if the remote has nothing it lacks.
    ///
    /// A remote with unmerged commits fails with [`SyncError::PushRace`];
    /// run [`sync`](Self::sync) instead.
    #[tracing::instrument(skip(self), fields(branch = %self.config.repo.branch))]
    pub fn push(&self, path: &str) -> MergeResult {
        let mut attempt = Attempt::new();
        let outcome = self.run_push(path, &mut attempt);
        attempt.finish(outcome)
    }

    // -- phases ---------------------------------------------------------------

    fn run_merge(
        &self,
        path: &str,
        resolver: &mut dyn ConflictResolver,
        mode: Mode,
        attempt: &mut Attempt,
    ) -> Result<RecordCollection, SyncError> {
        let heads = self.fetch_phase(attempt)?;

        self.checkpoint(attempt)?;
        let versions = self.read_versions(path, heads.local, heads.remote)?;
        let diff = merge::diff(&versions.base, &versions.local, &versions.remote);
        attempt.advance(SyncPhase::Diffed)?;
        tracing::info!(
            records = diff.merged().len(),
            conflicts = diff.conflicts().len(),
            "diffed"
        );

        self.checkpoint(attempt)?;
        let merged = if diff.is_clean() {
            attempt.advance(SyncPhase::CleanMerge)?;
            diff.merged().clone()
        } else {
            attempt.advance(SyncPhase::NeedsResolution)?;
            attempt.conflicts = diff.conflicts().to_vec();
            let resolved = merge::resolve_diff(&diff, &versions.remote, resolver)?;
            self.checkpoint(attempt)?;
            attempt.conflicts.clear();
            attempt.advance(SyncPhase::Resolved)?;
            resolved
        };

        self.checkpoint(attempt)?;
        self.commit_phase(path, &merged, &versions, heads, mode, attempt)?;
        Ok(merged)
    }

    fn run_push(&self, path: &str, attempt: &mut Attempt) -> Result<RecordCollection, SyncError> {
        let heads = self.fetch_phase(attempt)?;
        if heads.remote != heads.local && !self.repo.is_ancestor(heads.remote, heads.local)? {
            return Err(SyncError::PushRace {
                remote: self.config.repo.remote.clone(),
                message: format!(
                    "{} has commits not in the local branch, sync first",
                    self.config.repo.branch
                ),
            });
        }
        let bytes = self.reader.read_file(&self.repo, heads.local, path)?;
        let local = self.decode(path, "local", &bytes)?;
        self.push_phase(attempt)?;
        Ok(local)
    }

    /// START → FETCHED.
    fn fetch_phase(&self, attempt: &mut Attempt) -> Result<Heads, SyncError> {
        self.checkpoint(attempt)?;
        let remote = &self.config.repo.remote;
        let fetched = self.repo.fetch(remote, &self.config.repo.branch)?;
        attempt.advance(SyncPhase::Fetched)?;

        let local_head = self.repo.read_ref(&self.branch)?.ok_or_else(|| {
            SyncError::NotFound(format!("branch `{}` has no commits", self.config.repo.branch))
        })?;
        let heads = match fetched {
            FetchOutcome::Updated(oid) => Heads {
                local: local_head,
                remote: oid,
                remote_missing: false,
            },
            FetchOutcome::RemoteBranchMissing => {
                attempt.note(format!(
                    "{remote} has no branch `{}` yet",
                    self.config.repo.branch
                ));
                Heads {
                    local: local_head,
                    remote: local_head,
                    remote_missing: true,
                }
            }
        };
        tracing::info!(local = %heads.local.short(), remote = %heads.remote.short(), "fetched");
        Ok(heads)
    }

    fn read_versions(
        &self,
        path: &str,
        local_head: GitOid,
        remote_head: GitOid,
    ) -> Result<Versions, SyncError> {
        let base_commit = self.repo.merge_base(local_head, remote_head)?;
        let base_bytes = match base_commit {
            Some(base) => self.reader.read_file_opt(&self.repo, base, path)?,
            None => None,
        };
        let local_head_bytes = self.reader.read_file_opt(&self.repo, local_head, path)?;
        let remote_bytes = self.reader.read_file_opt(&self.repo, remote_head, path)?;
        let working = self.read_working(path)?;

        let local_bytes = working.as_deref().or(local_head_bytes.as_deref());
        if local_bytes.is_none() && remote_bytes.is_none() {
            return Err(SyncError::NotFound(format!(
                "{path} exists neither locally nor on {}",
                self.config.repo.remote
            )));
        }
        if base_bytes.is_some() {
            if local_bytes.is_none() {
                return Err(SyncError::NotFound(format!("{path} is missing locally")));
            }
            if remote_bytes.is_none() {
                return Err(SyncError::NotFound(format!(
                    "{path} is missing on {}",
                    self.config.repo.remote
                )));
            }
        }

        Ok(Versions {
            base_commit,
            base: self.decode_opt(path, "base", base_bytes.as_deref())?,
            local: self.decode_opt(path, "local", local_bytes)?,
            remote: self.decode_opt(path, "remote", remote_bytes.as_deref())?,
            local_head_bytes,
            remote_bytes,
        })
    }

    /// {CLEAN_MERGE | RESOLVED} → COMMITTED (or DONE when there is nothing
    /// to commit), then PUSHED in sync mode.
    fn commit_phase(
        &self,
        path: &str,
        merged: &RecordCollection,
        versions: &Versions,
        heads: Heads,
        mode: Mode,
        attempt: &mut Attempt,
    ) -> Result<(), SyncError> {
        let Heads {
            local: local_head,
            remote: remote_head,
            remote_missing,
        } = heads;
        let bytes = self.codec.encode(merged);
        let remote_in_local =
            remote_head == local_head || self.repo.is_ancestor(remote_head, local_head)?;
        let push = mode == Mode::Sync && self.config.sync.push;

        if remote_in_local && versions.local_head_bytes.as_deref() == Some(&bytes[..]) {
            attempt.note("nothing to merge");
            if push && (remote_head != local_head || remote_missing) {
                attempt.advance(SyncPhase::Committed)?;
                return self.push_phase(attempt);
            }
            return attempt.advance(SyncPhase::Done);
        }

        let local_tree = self.repo.read_commit(local_head)?.tree_oid;
        let remote_tree = self.repo.read_commit(remote_head)?.tree_oid;
        let local_flat = carry::flatten(&self.repo, local_tree)?;
        let remote_flat = carry::flatten(&self.repo, remote_tree)?;

        let local_in_remote = self.repo.is_ancestor(local_head, remote_head)?;
        if local_in_remote && versions.remote_bytes.as_deref() == Some(&bytes[..]) {
            let plan = carry::plan(&local_flat, &local_flat, &remote_flat, path)?;
            self.write_workdir(path, &bytes, &local_flat, &plan)?;
            self.repo
                .write_ref(
                    &self.branch,
                    remote_head,
                    Some(local_head),
                    "bibsync: fast-forward",
                )?;
            self.repo.reset_index(remote_tree)?;
            attempt.commit = Some(remote_head);
            attempt.advance(SyncPhase::Committed)?;
            attempt.note(format!("fast-forwarded to {}", remote_head.short()));
        } else {
            let base_flat = match versions.base_commit {
                Some(base) => {
                    carry::flatten(&self.repo, self.repo.read_commit(base)?.tree_oid)?
                }
                None => carry::FlatTree::new(),
            };
            let plan = carry::plan(&base_flat, &local_flat, &remote_flat, path)?;

            let blob = self.repo.write_blob(&bytes)?;
            let mode = local_flat
                .get(path)
                .or_else(|| remote_flat.get(path))
                .map_or(bibsync_git::EntryMode::Blob, |&(mode, _)| mode);
            let mut edits = plan.edits().to_vec();
            edits.push(TreeEdit::Upsert {
                path: path.to_owned(),
                mode,
                oid: blob,
            });
            let tree = self.repo.edit_tree(local_tree, &edits)?;
            let parents = if remote_in_local {
                vec![local_head]
            } else {
                vec![local_head, remote_head]
            };

            self.write_workdir(path, &bytes, &local_flat, &plan)?;
            let commit = self.repo.create_commit(
                tree,
                &parents,
                &self.config.sync.commit_message_for(path),
                Some(&self.branch),
            )?;
            attempt.commit = Some(commit);
            attempt.advance(SyncPhase::Committed)?;
            self.repo.reset_index(tree)?;
            tracing::info!(commit = %commit.short(), parents = parents.len(), "committed");
        }

        if push {
            self.push_phase(attempt)
        } else {
            attempt.advance(SyncPhase::Done)
        }
    }

    /// → PUSHED → DONE. Not cancellable.
    fn push_phase(&self, attempt: &mut Attempt) -> Result<(), SyncError> {
        let branch = self.branch.as_str();
        match self
            .repo
            .push_branch(&self.config.repo.remote, branch, branch)?
        {
            PushOutcome::Pushed => tracing::info!(remote = %self.config.repo.remote, "pushed"),
            PushOutcome::UpToDate => attempt.note("nothing to push"),
        }
        attempt.advance(SyncPhase::Pushed)?;
        attempt.advance(SyncPhase::Done)
    }

    // -- helpers --------------------------------------------------------------

    fn checkpoint(&self, attempt: &Attempt) -> Result<(), SyncError> {
        let phase = attempt.tracker.phase();
        match &self.cancel {
            Some(token) if token.is_cancelled() && phase.is_cancellable() => {
                Err(SyncError::Cancelled { phase })
            }
            _ => Ok(()),
        }
    }

    fn read_working(&self, path: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let Some(workdir) = self.repo.workdir() else {
            return Ok(None);
        };
        match std::fs::read(workdir.join(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Check, then write the merged file and every carried path.
    fn write_workdir(
        &self,
        path: &str,
        bytes: &[u8],
        local_flat: &carry::FlatTree,
        plan: &carry::CarryPlan,
    ) -> Result<(), SyncError> {
        let Some(workdir) = self.repo.workdir() else {
            return Ok(());
        };
        carry::ensure_clean(&self.repo, workdir, local_flat, plan)?;
        let executable = matches!(
            local_flat.get(path),
            Some(&(bibsync_git::EntryMode::BlobExecutable, _))
        );
        write_atomic(&workdir.join(path), bytes, executable)?;
        carry::apply_to_workdir(&self.repo, workdir, plan)
    }

    fn decode(&self, path: &str, version: &str, bytes: &[u8]) -> Result<RecordCollection, SyncError> {
        self.codec.decode(bytes).map_err(|source| SyncError::Parse {
            path: path.to_owned(),
            version: version.to_owned(),
            source,
        })
    }

    fn decode_opt(
        &self,
        path: &str,
        version: &str,
        bytes: Option<&[u8]>,
    ) -> Result<RecordCollection, SyncError> {
        bytes.map_or_else(|| Ok(RecordCollection::new()), |b| self.decode(path, version, b))
    }
}

/// Replace `path` with `bytes` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], executable: bool) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let mode = if executable { 0o755 } else { 0o644 };
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
