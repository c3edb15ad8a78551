//! Core types for the bibsync git abstraction layer.
//!
//! These types form the vocabulary shared between the [`GitRepo`](crate::GitRepo)
//! trait and the sync engine. They contain no gix types; the backend is an
//! implementation detail.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// GitOid
// ---------------------------------------------------------------------------

/// A git object identifier (SHA-1, 20 bytes).
///
/// Stored as raw bytes so it is `Copy` and cheap to hash. Displays as 40
/// lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid([u8; 20]);

impl GitOid {
    /// The zero OID (`0000...0000`).
    pub const ZERO: Self = Self([0; 20]);

    /// Create a `GitOid` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Return `true` if this is the zero OID.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The abbreviated 8-character form used in log lines and notes.
    #[must_use]
    pub fn short(&self) -> String {
        let mut full = self.to_string();
        full.truncate(8);
        full
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 40 {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (slot, pair) in bytes.iter_mut().zip(s.as_bytes().chunks(2)) {
            let digit = |b: u8| {
                hex_digit(b).ok_or_else(|| OidParseError {
                    value: s.to_owned(),
                    reason: format!("invalid hex digit '{}'", b as char),
                })
            };
            *slot = (digit(pair[0])? << 4) | digit(pair[1])?;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing a hex string into a [`GitOid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// RefName
// ---------------------------------------------------------------------------

/// A validated git ref name.
///
/// Must start with `refs/` or be `HEAD` / `FETCH_HEAD`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RefName(String);

const BARE_REFS: &[&str] = &["HEAD", "FETCH_HEAD"];

impl RefName {
    /// Create a new `RefName`, validating that it looks like a git ref.
    ///
    /// # Errors
    /// Returns an error if the name is empty, doesn't start with `refs/`,
    /// and isn't a well-known bare ref.
    pub fn new(name: &str) -> Result<Self, RefNameError> {
        Self::validate(name)?;
        Ok(Self(name.to_owned()))
    }

    /// `refs/heads/<branch>`.
    ///
    /// # Errors
    /// Returns an error if `branch` is empty or contains whitespace.
    pub fn branch(branch: &str) -> Result<Self, RefNameError> {
        Self::check_component(branch)?;
        Ok(Self(format!("refs/heads/{branch}")))
    }

    /// `refs/remotes/<remote>/<branch>`, where [`GitRepo::fetch`](crate::GitRepo::fetch)
    /// leaves the fetched head.
    ///
    /// # Errors
    /// Returns an error if either component is empty or contains whitespace.
    pub fn remote_tracking(remote: &str, branch: &str) -> Result<Self, RefNameError> {
        Self::check_component(remote)?;
        Self::check_component(branch)?;
        Ok(Self(format!("refs/remotes/{remote}/{branch}")))
    }

    /// Return the ref name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), RefNameError> {
        if name.is_empty() {
            return Err(RefNameError {
                value: name.to_owned(),
                reason: "ref name must not be empty".to_owned(),
            });
        }
        if name.starts_with("refs/") || BARE_REFS.contains(&name) {
            Ok(())
        } else {
            Err(RefNameError {
                value: name.to_owned(),
                reason: "ref name must start with 'refs/' or be HEAD/FETCH_HEAD".to_owned(),
            })
        }
    }

    fn check_component(part: &str) -> Result<(), RefNameError> {
        if part.is_empty() || part.chars().any(char::is_whitespace) || part.contains("..") {
            return Err(RefNameError {
                value: part.to_owned(),
                reason: "ref component must be non-empty without whitespace or '..'".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RefName {
    type Err = RefNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Error from validating a [`RefName`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefNameError {
    /// The invalid value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for RefNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ref name {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for RefNameError {}

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The file mode of a tree entry (analogous to `git ls-tree` mode column).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (`100644`).
    Blob,
    /// Executable file (`100755`).
    BlobExecutable,
    /// Subdirectory (`040000`).
    Tree,
    /// Symbolic link (`120000`).
    Link,
    /// Gitlink / submodule (`160000`).
    Commit,
}

impl EntryMode {
    /// `true` for regular and executable files.
    #[must_use]
    pub const fn is_blob(self) -> bool {
        matches!(self, Self::Blob | Self::BlobExecutable)
    }
}

/// A single entry in a git tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File or directory name (just the basename, not a full path).
    pub name: String,
    /// The entry mode.
    pub mode: EntryMode,
    /// The OID of the blob, tree, or commit this entry points to.
    pub oid: GitOid,
}

/// An edit operation on a tree.
///
/// Used with [`GitRepo::edit_tree`](crate::GitRepo::edit_tree) to build a new
/// tree from an existing one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeEdit {
    /// Insert or update an entry, creating intermediate trees as needed.
    Upsert {
        /// Slash-separated path relative to tree root (e.g., `"refs.bib"`).
        path: String,
        /// File mode for the entry.
        mode: EntryMode,
        /// OID of the object to store at this path.
        oid: GitOid,
    },
    /// Remove an entry. No-op if the path does not exist.
    Remove {
        /// Slash-separated path relative to tree root.
        path: String,
    },
}

// ---------------------------------------------------------------------------
// Commit types
// ---------------------------------------------------------------------------

/// Information about a commit object.
///
/// Returned by [`GitRepo::read_commit`](crate::GitRepo::read_commit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// OID of the tree this commit points to.
    pub tree_oid: GitOid,
    /// OIDs of parent commits (empty for root commits).
    pub parents: Vec<GitOid>,
    /// The commit message.
    pub message: String,
    /// Author identity string (e.g., `"Alice <alice@example.com>"`).
    pub author: String,
    /// Committer identity string.
    pub committer: String,
}

// ---------------------------------------------------------------------------
// Transport outcomes
// ---------------------------------------------------------------------------

/// Result of [`GitRepo::fetch`](crate::GitRepo::fetch).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote-tracking ref now points at this commit.
    Updated(GitOid),
    /// The remote exists but has no such branch yet.
    RemoteBranchMissing,
}

/// Result of [`GitRepo::push_branch`](crate::GitRepo::push_branch).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote ref was created or fast-forwarded.
    Pushed,
    /// The remote ref already pointed at the local commit.
    UpToDate,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_roundtrip_hex() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        let oid: GitOid = hex.parse().unwrap();
        assert_eq!(oid.to_string(), hex);
        assert_eq!(oid.short(), "01234567");
    }

    #[test]
    fn oid_parse_tolerates_trailing_newline() {
        let hex = format!("{}\n", "ab".repeat(20));
        let oid: GitOid = hex.parse().unwrap();
        assert_eq!(oid.as_bytes(), &[0xab; 20]);
    }

    #[test]
    fn oid_rejects_short_and_non_hex() {
        assert!("abc".parse::<GitOid>().is_err());
        assert!("g".repeat(40).parse::<GitOid>().is_err());
    }

    #[test]
    fn oid_zero() {
        assert!(GitOid::ZERO.is_zero());
        assert!(!GitOid::from_bytes([1; 20]).is_zero());
    }

    #[test]
    fn refname_branch_and_tracking() {
        assert_eq!(RefName::branch("main").unwrap().as_str(), "refs/heads/main");
        assert_eq!(
            RefName::remote_tracking("origin", "main").unwrap().as_str(),
            "refs/remotes/origin/main"
        );
    }

    #[test]
    fn refname_rejects_bad_components() {
        assert!(RefName::branch("").is_err());
        assert!(RefName::branch("my branch").is_err());
        assert!(RefName::remote_tracking("origin", "a..b").is_err());
    }

    #[test]
    fn refname_validation() {
        assert!(RefName::new("HEAD").is_ok());
        assert!(RefName::new("refs/heads/main").is_ok());
        assert!(RefName::new("main").is_err());
        assert!(RefName::new("").is_err());
    }

    #[test]
    fn entry_mode_is_blob() {
        assert!(EntryMode::Blob.is_blob());
        assert!(EntryMode::BlobExecutable.is_blob());
        assert!(!EntryMode::Tree.is_blob());
    }
}
