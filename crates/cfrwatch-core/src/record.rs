//! Canonical records and the revision index built from a fetched document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One boundary-definition section as reported by the regulatory text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub identifier: String,
    pub name: String,
    /// Citation (or statutory authority) text. It changes whenever the
    /// section is amended, so exact equality means "in sync".
    pub revision_fingerprint: String,
}

/// Identifier -> latest record reported by one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionIndex {
    records: BTreeMap<String, CanonicalRecord>,
}

impl RevisionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the one it displaced. Last-seen wins.
    pub fn insert(&mut self, record: CanonicalRecord) -> Option<CanonicalRecord> {
        self.records.insert(record.identifier.clone(), record)
    }

    pub fn get(&self, identifier: &str) -> Option<&CanonicalRecord> {
        self.records.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.records.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalRecord> {
        self.records.values()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

impl FromIterator<CanonicalRecord> for RevisionIndex {
    fn from_iter<I: IntoIterator<Item = CanonicalRecord>>(iter: I) -> Self {
        let mut index = Self::new();
        for record in iter {
            index.insert(record);
        }
        index
    }
}

/// Numeric suffix of a section identifier: the leading digits after the
/// first `.` (`"9.126"` -> `126`, `"9.34a"` -> `34`).
pub fn record_sequence(identifier: &str) -> Option<u64> {
    let (_, suffix) = identifier.trim().split_once('.')?;
    let digits_end = suffix
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(suffix.len());
    suffix[..digits_end].parse().ok()
}
