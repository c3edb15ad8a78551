//! Fetch and push via the git CLI.
//!
//! Network transport is the one area kept as a CLI subprocess: gix has no
//! high-level push API, and shelling out keeps credential helpers, SSH
//! config and proxies working exactly as they do for the user's own `git`.

use std::path::Path;
use std::process::{Command, Output};

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::{FetchOutcome, PushOutcome, RefName};

fn git_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        // stderr is matched below
        .env("LC_ALL", "C");
    cmd
}

fn run_git(repo: &GixRepo, args: &[&str]) -> Result<Output, GitError> {
    tracing::debug!(?args, "running git");
    Ok(git_command(repo.command_dir(), args).output()?)
}

pub fn fetch(repo: &GixRepo, remote: &str, branch: &str) -> Result<FetchOutcome, GitError> {
    let tracking = RefName::remote_tracking(remote, branch).map_err(|e| GitError::BackendError {
        message: e.to_string(),
    })?;
    let refspec = format!("+refs/heads/{branch}:{tracking}");

    let output = run_git(repo, &["fetch", "--no-tags", "--quiet", remote, &refspec])?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();

        // The remote is reachable but has never seen this branch.
        if stderr.contains("couldn't find remote ref") || stderr.contains("no such ref was fetched")
        {
            return Ok(FetchOutcome::RemoteBranchMissing);
        }

        return Err(GitError::Transport {
            remote: remote.to_owned(),
            message: stderr.to_owned(),
        });
    }

    match crate::refs_impl::read_ref(repo, &tracking)? {
        Some(oid) => Ok(FetchOutcome::Updated(oid)),
        None => Err(GitError::NotFound {
            message: format!("{tracking} missing after successful fetch"),
        }),
    }
}

pub fn push_branch(
    repo: &GixRepo,
    remote: &str,
    local_ref: &str,
    remote_ref: &str,
) -> Result<PushOutcome, GitError> {
    let refspec = format!("{local_ref}:{remote_ref}");
    let output = run_git(repo, &["push", "--porcelain", remote, &refspec])?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let status = parse_porcelain(&stdout, remote_ref);

    match status {
        Some(PorcelainFlag::Rejected(reason)) => Err(GitError::PushRejected {
            remote: remote.to_owned(),
            message: reason,
        }),
        Some(PorcelainFlag::Refused(reason)) => Err(GitError::PushRefused {
            remote: remote.to_owned(),
            message: reason,
        }),
        _ if !output.status.success() => Err(GitError::Transport {
            remote: remote.to_owned(),
            message: stderr.trim().to_owned(),
        }),
        Some(PorcelainFlag::UpToDate) => Ok(PushOutcome::UpToDate),
        Some(PorcelainFlag::Updated) | None => Ok(PushOutcome::Pushed),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PorcelainFlag {
    Updated,
    UpToDate,
    /// The remote branch moved: fetch, merge and push again.
    Rejected(String),
    /// Refused for any other reason (hooks, protected branches, permissions).
    Refused(String),
}

/// Summaries git prints when the remote tip is not an ancestor of ours.
const MOVED_REASONS: [&str; 3] = ["(fetch first)", "(non-fast-forward)", "(stale info)"];

fn rejection(summary: &str) -> PorcelainFlag {
    if summary.starts_with("[rejected]") && MOVED_REASONS.iter().any(|r| summary.contains(r)) {
        PorcelainFlag::Rejected(summary.to_owned())
    } else {
        PorcelainFlag::Refused(summary.to_owned())
    }
}

/// Find the status line for `remote_ref` in `git push --porcelain` output.
///
/// Lines look like `<flag>\t<from>:<to>\t<summary>`; `=` is up to date and
/// `!` is rejected or refused depending on the summary.
fn parse_porcelain(stdout: &str, remote_ref: &str) -> Option<PorcelainFlag> {
    stdout.lines().find_map(|line| {
        let mut parts = line.splitn(3, '\t');
        let flag = parts.next()?;
        let refs = parts.next()?;
        let summary = parts.next().unwrap_or("").trim();
        if !refs.ends_with(&format!(":{remote_ref}")) {
            return None;
        }
        Some(match flag {
            "=" => PorcelainFlag::UpToDate,
            "!" => rejection(summary),
            _ => PorcelainFlag::Updated,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_runs_in_the_c_locale() {
        let cmd = git_command(Path::new("."), &["fetch"]);
        let envs: Vec<_> = cmd.get_envs().collect();
        assert!(envs.contains(&(std::ffi::OsStr::new("LC_ALL"), Some(std::ffi::OsStr::new("C")))));
    }

    #[test]
    fn porcelain_up_to_date() {
        let out = "To /tmp/remote.git\n=\trefs/heads/main:refs/heads/main\t[up to date]\nDone\n";
        assert_eq!(
            parse_porcelain(out, "refs/heads/main"),
            Some(PorcelainFlag::UpToDate)
        );
    }

    #[test]
    fn porcelain_fast_forward() {
        let out = "To /tmp/remote.git\n \trefs/heads/main:refs/heads/main\tabc1234..def5678\nDone\n";
        assert_eq!(
            parse_porcelain(out, "refs/heads/main"),
            Some(PorcelainFlag::Updated)
        );
    }

    #[test]
    fn porcelain_rejected() {
        let out = "To /tmp/remote.git\n!\trefs/heads/main:refs/heads/main\t[rejected] (fetch first)\nDone\n";
        assert_eq!(
            parse_porcelain(out, "refs/heads/main"),
            Some(PorcelainFlag::Rejected("[rejected] (fetch first)".to_owned()))
        );
    }

    #[test]
    fn porcelain_non_fast_forward_is_a_rejection() {
        let out = "!\trefs/heads/main:refs/heads/main\t[rejected] (non-fast-forward)\n";
        assert!(matches!(
            parse_porcelain(out, "refs/heads/main"),
            Some(PorcelainFlag::Rejected(_))
        ));
        let out = "!\trefs/heads/main:refs/heads/main\t[rejected] (stale info)\n";
        assert!(matches!(
            parse_porcelain(out, "refs/heads/main"),
            Some(PorcelainFlag::Rejected(_))
        ));
    }

    #[test]
    fn porcelain_hook_decline_is_a_refusal() {
        let out = "To /tmp/remote.git\n!\trefs/heads/main:refs/heads/main\t[remote rejected] (pre-receive hook declined)\nDone\n";
        assert_eq!(
            parse_porcelain(out, "refs/heads/main"),
            Some(PorcelainFlag::Refused(
                "[remote rejected] (pre-receive hook declined)".to_owned()
            ))
        );
        let out = "!\trefs/heads/main:refs/heads/main\t[rejected] (hook declined)\n";
        assert!(matches!(
            parse_porcelain(out, "refs/heads/main"),
            Some(PorcelainFlag::Refused(_))
        ));
    }

    #[test]
    fn porcelain_ignores_other_refs() {
        let out = "=\trefs/heads/dev:refs/heads/dev\t[up to date]\n";
        assert_eq!(parse_porcelain(out, "refs/heads/main"), None);
    }
}
