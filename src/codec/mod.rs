//! Byte-string ↔ record-collection codecs.
//!
//! The merge engine never looks at file bytes directly: it decodes base,
//! local and remote through a [`RecordCodec`], merges collections, and
//! encodes the result. Encoding must be stable: encoding the decode of a
//! file already in canonical form reproduces it byte for byte.

mod bibtex;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::{KEY_FIELD, Record, RecordCollection, RecordKey};

pub use bibtex::BibtexCodec;

/// Converts file bytes to records and back.
pub trait RecordCodec {
    /// Parse `bytes` into a collection.
    ///
    /// # Errors
    /// Returns [`CodecError`] if the input is not valid for this format.
    /// Decoding fails closed: anything the codec does not fully understand
    /// is an error rather than a best guess.
    fn decode(&self, bytes: &[u8]) -> Result<RecordCollection, CodecError>;

    /// Render a collection in canonical form.
    fn encode(&self, records: &RecordCollection) -> Vec<u8>;
}

/// Decode failure, always pinned to a 1-based line.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: invalid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("line {line}: duplicate record key `{key}`")]
    DuplicateKey { line: usize, key: RecordKey },
}

impl CodecError {
    #[must_use]
    pub const fn line(&self) -> usize {
        match self {
            Self::Parse { line, .. }
            | Self::InvalidUtf8 { line }
            | Self::DuplicateKey { line, .. } => *line,
        }
    }
}

// ---------------------------------------------------------------------------
// IdentityPolicy
// ---------------------------------------------------------------------------

/// How a record's [`RecordKey`] is derived at decode time.
///
/// Parsed from `"citation-key"` or `"field:<name>"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdentityPolicy {
    /// The citation key, trimmed.
    #[default]
    CitationKey,
    /// The trimmed, lower-cased value of the named field (e.g. `doi`).
    Field(String),
}

impl IdentityPolicy {
    /// Compute the identity of `record` under this policy.
    #[must_use]
    pub fn key_for(&self, record: &Record) -> Option<RecordKey> {
        match self {
            Self::CitationKey => record.get(KEY_FIELD).and_then(RecordKey::new),
            Self::Field(name) => record
                .get(name)
                .and_then(|v| RecordKey::new(&v.to_lowercase())),
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CitationKey => write!(f, "citation-key"),
            Self::Field(name) => write!(f, "field:{name}"),
        }
    }
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "citation-key" => Ok(Self::CitationKey),
            other => match other.strip_prefix("field:").map(str::trim) {
                Some(name) if !name.is_empty() => Ok(Self::Field(name.to_lowercase())),
                _ => Err(format!(
                    "unknown identity policy `{other}` (expected `citation-key` or `field:<name>`)"
                )),
            },
        }
    }
}

impl TryFrom<String> for IdentityPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IdentityPolicy> for String {
    fn from(policy: IdentityPolicy) -> Self {
        policy.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_policies() {
        assert_eq!(
            "citation-key".parse::<IdentityPolicy>().unwrap(),
            IdentityPolicy::CitationKey
        );
        assert_eq!(
            "field:DOI".parse::<IdentityPolicy>().unwrap(),
            IdentityPolicy::Field("doi".to_owned())
        );
        assert!("field:".parse::<IdentityPolicy>().is_err());
        assert!("isbn".parse::<IdentityPolicy>().is_err());
    }

    #[test]
    fn display_roundtrips() {
        for p in [IdentityPolicy::CitationKey, IdentityPolicy::Field("doi".into())] {
            assert_eq!(p.to_string().parse::<IdentityPolicy>().unwrap(), p);
        }
    }

    #[test]
    fn field_policy_normalizes_value() {
        let record = Record::new(None).with_field("doi", "  10.1000/ABC ");
        let key = IdentityPolicy::Field("doi".into()).key_for(&record).unwrap();
        assert_eq!(key.as_str(), "10.1000/abc");
    }

    #[test]
    fn missing_identity_field_gives_no_key() {
        let record = Record::new(None).with_field("title", "x");
        assert!(IdentityPolicy::Field("doi".into()).key_for(&record).is_none());
        assert!(IdentityPolicy::CitationKey.key_for(&record).is_none());
    }

    #[test]
    fn error_reports_line() {
        let err = CodecError::InvalidUtf8 { line: 7 };
        assert_eq!(err.line(), 7);
        assert_eq!(err.to_string(), "line 7: invalid UTF-8");
    }
}
