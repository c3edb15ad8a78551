//! Shared test helpers for bibsync integration tests.
//!
//! All tests use temp directories, with no side effects on the real repo.
//! Each test gets a bare "server" remote plus two clones (alice and bob)
//! via [`setup`], driven with the `git` CLI.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

use bibsync::SyncEngine;
use bibsync::codec::{BibtexCodec, RecordCodec};
use bibsync::config::BibsyncConfig;
use bibsync::record::{RecordCollection, RecordKey};
use bibsync_git::GixRepo;
use tempfile::TempDir;

pub const BIB: &str = "refs.bib";

/// Canonical starting bibliography shared by every fixture.
pub const BASE: &str = "\
@article{a,
  author = {X},
  doi = {d1},
}

@book{b,
  title = {Old},
  year = 1999,
}
";

/// A bare remote and two clones of it, all on `main`.
pub struct Fixture {
    pub remote: TempDir,
    pub alice: TempDir,
    pub bob: TempDir,
}

impl Fixture {
    pub fn alice(&self) -> &Path {
        self.alice.path()
    }

    pub fn bob(&self) -> &Path {
        self.bob.path()
    }

    /// `main` on the remote.
    pub fn remote_head(&self) -> String {
        git(self.remote.path(), &["rev-parse", "refs/heads/main"])
    }
}

/// Bare remote seeded with [`BASE`] (and a README) by alice; bob clones it.
pub fn setup() -> Fixture {
    let remote = TempDir::new().expect("failed to create remote temp dir");
    git(remote.path(), &["init", "-q", "--bare", "--initial-branch=main"]);

    let alice = clone(remote.path());
    write(alice.path(), BIB, BASE);
    write(alice.path(), "README.md", "# refs\n");
    commit_all(alice.path(), "initial bibliography");
    git(alice.path(), &["push", "-q", "-u", "origin", "main"]);

    let bob = clone(remote.path());
    Fixture { remote, alice, bob }
}

/// A fresh clone of `remote` with a test identity.
pub fn clone(remote: &Path) -> TempDir {
    let dir = TempDir::new().expect("failed to create clone temp dir");
    let url = remote.to_str().expect("utf-8 temp path");
    git(dir.path(), &["clone", "-q", url, "."]);
    // cloning an empty remote leaves HEAD on the clone's default branch
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir.path(), &["config", "user.name", "Test"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    dir
}

/// Run git and return trimmed stdout, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = git_output(dir, args);
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

pub fn git_output(dir: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to run git")
}

pub fn write(dir: &Path, path: &str, content: &str) {
    let full = dir.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

pub fn read(dir: &Path, path: &str) -> String {
    std::fs::read_to_string(dir.join(path)).unwrap()
}

pub fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Commit everything and push `main`.
pub fn publish(dir: &Path, message: &str) {
    commit_all(dir, message);
    git(dir, &["push", "-q", "origin", "main"]);
}

/// Install a `pre-receive` hook on a bare remote that declines every push.
#[cfg(unix)]
pub fn decline_pushes(remote: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let hook = remote.join("hooks").join("pre-receive");
    std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
    std::fs::write(&hook, "#!/bin/sh\necho 'branch is frozen' >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
}

pub fn head(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"])
}

pub fn parents(dir: &Path, rev: &str) -> Vec<String> {
    git(dir, &["rev-list", "--parents", "-n", "1", rev])
        .split_whitespace()
        .skip(1)
        .map(str::to_owned)
        .collect()
}

/// `git status --porcelain`; empty when index and working tree match HEAD.
pub fn status(dir: &Path) -> String {
    git(dir, &["status", "--porcelain"])
}

/// Contents of `path` at `rev`.
pub fn show(dir: &Path, rev: &str, path: &str) -> String {
    git(dir, &["show", &format!("{rev}:{path}")])
}

pub fn engine(dir: &Path) -> SyncEngine<GixRepo> {
    engine_with(dir, BibsyncConfig::default())
}

pub fn engine_with(dir: &Path, config: BibsyncConfig) -> SyncEngine<GixRepo> {
    SyncEngine::new(GixRepo::open(dir).expect("open repo"), config).expect("engine")
}

pub fn decode(text: &str) -> RecordCollection {
    BibtexCodec::default()
        .decode(text.as_bytes())
        .expect("valid bibliography")
}

pub fn key(s: &str) -> RecordKey {
    RecordKey::new(s).expect("non-empty key")
}

/// `BASE` with record `a`'s author replaced.
pub fn with_author(author: &str) -> String {
    BASE.replace("author = {X}", &format!("author = {{{author}}}"))
}

/// `BASE` with record `b`'s title replaced.
pub fn with_title(title: &str) -> String {
    BASE.replace("title = {Old}", &format!("title = {{{title}}}"))
}
