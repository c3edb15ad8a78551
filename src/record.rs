//! Record model: keyed bibliography entries and the arena that holds them.
//!
//! A [`Record`] is an ordered list of `(name, value)` fields. Its identity
//! ([`RecordKey`]) is snapshotted when the record is built and never
//! recomputed, so editing a field that fed the key does not move the record
//! under a different key mid-merge.
//!
//! [`RecordCollection`] stores records in file order (`Vec<Record>`) with a
//! side index from key to position. Records without a key are allowed; they
//! can never be matched across versions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reserved field holding the entry type (`article`, `book`, ...).
pub const TYPE_FIELD: &str = "@type";

/// Reserved field holding the citation key as written in the file.
pub const KEY_FIELD: &str = "@key";

// ---------------------------------------------------------------------------
// RecordKey
// ---------------------------------------------------------------------------

/// Normalized identity of a record.
///
/// Keys are compared by exact string equality. Normalization (trimming,
/// case folding) is the job of whoever builds the key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Build a key, returning `None` if `value` is empty after trimming.
    #[must_use]
    pub fn new(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single named field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// One bibliography entry.
///
/// Field names are unique within a record. An absent field and a field with
/// an empty value are different states.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    key: Option<RecordKey>,
    fields: Vec<Field>,
}

impl Record {
    /// Create an empty record with the given identity.
    #[must_use]
    pub const fn new(key: Option<RecordKey>) -> Self {
        Self {
            key,
            fields: Vec::new(),
        }
    }

    /// Attach an identity while the record is still being built.
    #[must_use]
    pub fn with_key(mut self, key: Option<RecordKey>) -> Self {
        self.key = key;
        self
    }

    /// Builder form of [`Record::set`].
    #[must_use]
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub const fn key(&self) -> Option<&RecordKey> {
        self.key.as_ref()
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Value of field `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Set a field, replacing it in place if it exists, appending otherwise.
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            value.clone_into(&mut field.value);
        } else {
            self.fields.push(Field {
                name: name.to_owned(),
                value: value.to_owned(),
            });
        }
    }

    /// Remove a field, returning its old value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(pos).value)
    }

    /// Entry type from the reserved [`TYPE_FIELD`].
    #[must_use]
    pub fn entry_type(&self) -> Option<&str> {
        self.get(TYPE_FIELD)
    }

    /// Iterate over field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Same identity and same set of fields, ignoring field order.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.key == other.key
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|f| other.get(&f.name) == Some(f.value.as_str()))
    }
}

// ---------------------------------------------------------------------------
// RecordCollection
// ---------------------------------------------------------------------------

/// A record was inserted under a key that is already taken.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("duplicate record key `{0}`")]
pub struct DuplicateKeyError(pub RecordKey);

/// Arena of records in file order, indexed by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordCollection {
    records: Vec<Record>,
    index: HashMap<RecordKey, usize>,
}

impl RecordCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection, rejecting duplicate keys.
    ///
    /// # Errors
    /// Returns [`DuplicateKeyError`] for the first repeated key.
    pub fn from_records(
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self, DuplicateKeyError> {
        let mut collection = Self::new();
        for record in records {
            collection.push(record)?;
        }
        Ok(collection)
    }

    /// Append a record.
    ///
    /// # Errors
    /// Returns [`DuplicateKeyError`] if a record with the same key exists.
    pub fn push(&mut self, record: Record) -> Result<(), DuplicateKeyError> {
        if let Some(key) = record.key()
            && self.index.contains_key(key)
        {
            return Err(DuplicateKeyError(key.clone()));
        }
        self.push_or_replace(record);
        Ok(())
    }

    /// Append a record, or overwrite the record already stored under its key
    /// (keeping that record's position).
    pub fn push_or_replace(&mut self, record: Record) {
        match record.key().and_then(|k| self.index.get(k)).copied() {
            Some(pos) => self.records[pos] = record,
            None => {
                if let Some(key) = record.key() {
                    self.index.insert(key.clone(), self.records.len());
                }
                self.records.push(record);
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    #[must_use]
    pub fn contains_key(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Keys in file order (unkeyed records are skipped).
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.records.iter().filter_map(Record::key)
    }

    /// True if both collections hold the same records, ignoring record and
    /// field order.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.records.iter().all(|r| match r.key() {
            Some(key) => other.get(key).is_some_and(|o| o.same_content(r)),
            None => other.records.iter().any(|o| o.same_content(r)),
        })
    }
}

impl<'a> IntoIterator for &'a RecordCollection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Serialize for RecordCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.records)
    }
}

impl<'de> Deserialize<'de> for RecordCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<Record>::deserialize(deserializer)?;
        Self::from_records(records).map_err(serde::de::Error::custom)
    }
}
