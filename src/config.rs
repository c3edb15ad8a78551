//! Repository configuration (`.bibsync.toml`).
//!
//! Defines which branch and remote a sync talks to, how records are
//! identified, and how merge commits are written.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::codec::IdentityPolicy;

/// File name of the configuration, relative to the repository root.
pub const CONFIG_FILE: &str = ".bibsync.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level bibsync configuration.
///
/// Parsed from `.bibsync.toml`. Missing fields use defaults.
/// Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BibsyncConfig {
    /// Branch and remote settings.
    #[serde(default)]
    pub repo: RepoConfig,

    /// Merge and commit settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// RepoConfig
// ---------------------------------------------------------------------------

/// Which branch is synchronized, and with which remote.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// The branch name (default: `"main"`).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// The remote name (default: `"origin"`).
    #[serde(default = "default_remote")]
    pub remote: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            remote: default_remote(),
        }
    }
}

fn default_branch() -> String {
    "main".to_owned()
}

fn default_remote() -> String {
    "origin".to_owned()
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Merge and commit behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// How records are matched across versions.
    #[serde(default)]
    pub identity: IdentityPolicy,

    /// Commit message template. `{file}` is replaced by the file path.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Whether `sync` pushes after committing.
    #[serde(default = "default_push")]
    pub push: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            identity: IdentityPolicy::default(),
            commit_message: default_commit_message(),
            push: default_push(),
        }
    }
}

impl SyncConfig {
    /// The commit message for a merge of `file`.
    #[must_use]
    pub fn commit_message_for(&self, file: &str) -> String {
        self.commit_message.replace("{file}", file)
    }
}

fn default_commit_message() -> String {
    "bibsync: merge {file}".to_owned()
}

const fn default_push() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Why `.bibsync.toml` could not be used.
#[derive(Debug)]
pub struct ConfigError {
    /// The file, when the error came from [`BibsyncConfig::load`].
    pub path: Option<PathBuf>,
    /// 1-based line of the offending TOML, when toml reports a span.
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "{}: ", p.display())?,
            None => f.write_str("bibsync config: ")?,
        }
        if let Some(line) = self.line {
            write!(f, "line {line}: ")?;
        }
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigError {}

impl BibsyncConfig {
    /// Load [`CONFIG_FILE`] from a repository's working tree root.
    ///
    /// # Errors
    /// See [`BibsyncConfig::load`].
    pub fn load_from_root(root: &Path) -> Result<Self, ConfigError> {
        Self::load(&root.join(CONFIG_FILE))
    }

    /// Read and parse `path`. A repository without a config file syncs
    /// `origin/main` with the defaults, so a missing file is not an error.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    line: None,
                    message: format!("cannot read: {e}"),
                });
            }
        };
        let config = Self::parse(&text).map_err(|e| ConfigError {
            path: Some(path.to_owned()),
            ..e
        })?;
        tracing::debug!(
            path = %path.display(),
            branch = %config.repo.branch,
            remote = %config.repo.remote,
            "loaded config"
        );
        Ok(config)
    }

    /// Parse the contents of a config file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on malformed TOML, unknown keys or a bad
    /// identity policy.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError {
            path: None,
            line: e.span().map(|span| line_at(text, span.start)),
            message: e.message().to_owned(),
        })
    }
}

fn line_at(text: &str, offset: usize) -> usize {
    text.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
