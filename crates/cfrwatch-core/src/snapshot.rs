//! Local GeoJSON snapshots and representative-feature selection.
//!
//! Each snapshot file is a feature collection. When a file embeds several
//! historical revisions of one area, a [`SelectionRule`] picks the feature
//! that stands for the file's current state.

use crate::record::record_sequence;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_EXTENSION: &str = "geojson";
pub const DEFAULT_SECONDARY_FIELD: &str = "ava_id";
pub const DEFAULT_VALIDITY_FIELD: &str = "valid_end";

const PROP_IDENTIFIER: &str = "cfr_index";
const PROP_NAME: &str = "name";
const PROP_FINGERPRINT: &str = "cfr_revision_history";

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON feature collection.
    #[error("invalid GeoJSON at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The collection holds no features at all.
    #[error("{path}: feature collection has no features")]
    Empty { path: String },

    /// The representative feature lacks a required string property.
    #[error("{path}: feature #{position} has no string property `{field}`")]
    Property {
        path: String,
        position: usize,
        field: String,
    },

    /// A multi-feature file has a feature without the secondary identifier
    /// the selection rule needs.
    #[error("{path}: feature #{position} has no secondary identifier `{field}`")]
    Secondary {
        path: String,
        position: usize,
        field: String,
    },
}

/// How to choose one feature from a file holding several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionRule {
    /// Largest secondary identifier; lower ones are superseded revisions.
    #[default]
    HighestSecondary,
    LowestSecondary,
    /// The feature whose validity has not ended.
    OpenValidity,
    /// Whatever comes first in the file.
    First,
}

impl SelectionRule {
    pub const ALL: [SelectionRule; 4] = [
        SelectionRule::HighestSecondary,
        SelectionRule::LowestSecondary,
        SelectionRule::OpenValidity,
        SelectionRule::First,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SelectionRule::HighestSecondary => "highest-secondary",
            SelectionRule::LowestSecondary => "lowest-secondary",
            SelectionRule::OpenValidity => "open-validity",
            SelectionRule::First => "first",
        }
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SelectionRule::ALL
            .into_iter()
            .find(|rule| rule.as_str() == s.trim())
            .ok_or_else(|| {
                let known: Vec<&str> = SelectionRule::ALL.iter().map(|r| r.as_str()).collect();
                format!(
                    "unknown selection rule `{s}` (expected one of: {})",
                    known.join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// File extension without the leading dot.
    pub extension: String,
    pub selection: SelectionRule,
    pub secondary_field: String,
    pub validity_field: String,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            selection: SelectionRule::default(),
            secondary_field: DEFAULT_SECONDARY_FIELD.to_string(),
            validity_field: DEFAULT_VALIDITY_FIELD.to_string(),
        }
    }
}

/// Sort key for the per-area secondary identifier. Integers (or integer
/// strings) order numerically and sort before free-form text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecondaryId {
    Numeric(u64),
    Text(String),
}

impl SecondaryId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_u64().map(SecondaryId::Numeric),
            Value::String(text) if !text.trim().is_empty() => Some(
                text.trim()
                    .parse()
                    .map(SecondaryId::Numeric)
                    .unwrap_or_else(|_| SecondaryId::Text(text.trim().to_string())),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for SecondaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecondaryId::Numeric(n) => write!(f, "{n}"),
            SecondaryId::Text(text) => f.write_str(text),
        }
    }
}

/// The representative feature of one snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub path: PathBuf,
    pub identifier: String,
    pub name: String,
    pub revision_fingerprint: String,
    pub secondary: Option<SecondaryId>,
    /// Numeric suffix of `identifier`. Pending records such as `9.tbd` have
    /// none and never move the watermark.
    pub sequence: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

struct Candidate {
    position: usize,
    properties: Map<String, Value>,
}

/// Snapshot files in `dir`, sorted by path. A directory that cannot be listed
/// yields no files.
pub fn list_snapshot_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let extension = extension.trim_start_matches('.');
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "snapshot directory not readable; skipping");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|path| {
            path.extension().and_then(|ext| ext.to_str()) == Some(extension) && path.is_file()
        })
        .collect();
    files.sort();
    files
}

pub fn read_directory(
    dir: &Path,
    options: &SnapshotOptions,
) -> Result<Vec<LocalSnapshot>, SnapshotError> {
    list_snapshot_files(dir, &options.extension)
        .iter()
        .map(|path| read_snapshot_file(path, options))
        .collect()
}

pub fn read_snapshot_file(
    path: &Path,
    options: &SnapshotOptions,
) -> Result<LocalSnapshot, SnapshotError> {
    let bytes = fs::read(path).map_err(|source| SnapshotError::Read {
        path: display_path(path),
        source,
    })?;
    decode_snapshot(path, &bytes, options)
}

pub fn decode_snapshot(
    path: &Path,
    bytes: &[u8],
    options: &SnapshotOptions,
) -> Result<LocalSnapshot, SnapshotError> {
    let collection: FeatureCollection =
        serde_json::from_slice(bytes).map_err(|source| SnapshotError::Json {
            path: display_path(path),
            source,
        })?;
    let candidates: Vec<Candidate> = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(position, feature)| Candidate {
            position,
            properties: feature.properties.unwrap_or_default(),
        })
        .collect();
    let feature_count = candidates.len();
    let chosen = select_representative(path, candidates, options)?;

    let identifier = string_property(path, &chosen, PROP_IDENTIFIER)?;
    let sequence = record_sequence(&identifier);
    let snapshot = LocalSnapshot {
        path: path.to_path_buf(),
        name: string_property(path, &chosen, PROP_NAME)?,
        revision_fingerprint: string_property(path, &chosen, PROP_FINGERPRINT)?,
        secondary: chosen
            .properties
            .get(&options.secondary_field)
            .and_then(SecondaryId::from_value),
        identifier,
        sequence,
    };
    debug!(
        path = %path.display(),
        identifier = %snapshot.identifier,
        features = feature_count,
        position = chosen.position,
        "decoded snapshot"
    );
    Ok(snapshot)
}

fn select_representative(
    path: &Path,
    mut candidates: Vec<Candidate>,
    options: &SnapshotOptions,
) -> Result<Candidate, SnapshotError> {
    if candidates.len() <= 1 {
        return candidates.pop().ok_or_else(|| SnapshotError::Empty {
            path: display_path(path),
        });
    }

    match options.selection {
        SelectionRule::First => Ok(candidates.swap_remove(0)),
        SelectionRule::LowestSecondary => {
            let mut keyed = keyed_by_secondary(path, candidates, &options.secondary_field)?;
            Ok(keyed.swap_remove(0).1)
        }
        SelectionRule::HighestSecondary => highest_secondary(path, candidates, options),
        SelectionRule::OpenValidity => {
            let (mut open, closed): (Vec<Candidate>, Vec<Candidate>) = candidates
                .into_iter()
                .partition(|candidate| validity_is_open(candidate, &options.validity_field));
            match open.len() {
                0 => highest_secondary(path, closed, options),
                1 => Ok(open.swap_remove(0)),
                _ => highest_secondary(path, open, options),
            }
        }
    }
}

fn highest_secondary(
    path: &Path,
    candidates: Vec<Candidate>,
    options: &SnapshotOptions,
) -> Result<Candidate, SnapshotError> {
    let mut keyed = keyed_by_secondary(path, candidates, &options.secondary_field)?;
    keyed.pop().map(|(_, candidate)| candidate).ok_or_else(|| SnapshotError::Empty {
        path: display_path(path),
    })
}

/// Candidates sorted ascending by secondary identifier, file order breaking ties.
fn keyed_by_secondary(
    path: &Path,
    candidates: Vec<Candidate>,
    field: &str,
) -> Result<Vec<(SecondaryId, Candidate)>, SnapshotError> {
    let mut keyed = candidates
        .into_iter()
        .map(|candidate| {
            let key = candidate
                .properties
                .get(field)
                .and_then(SecondaryId::from_value)
                .ok_or_else(|| SnapshotError::Secondary {
                    path: display_path(path),
                    position: candidate.position,
                    field: field.to_string(),
                })?;
            Ok((key, candidate))
        })
        .collect::<Result<Vec<_>, SnapshotError>>()?;
    keyed.sort_by(|(a_key, a), (b_key, b)| match a_key.cmp(b_key) {
        Ordering::Equal => a.position.cmp(&b.position),
        other => other,
    });
    Ok(keyed)
}

fn validity_is_open(candidate: &Candidate, field: &str) -> bool {
    match candidate.properties.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

fn string_property(
    path: &Path,
    candidate: &Candidate,
    field: &str,
) -> Result<String, SnapshotError> {
    candidate
        .properties
        .get(field)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| SnapshotError::Property {
            path: display_path(path),
            position: candidate.position,
            field: field.to_string(),
        })
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
