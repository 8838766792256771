//! Cross-reference a revision index against local snapshots.
//!
//! Snapshots are observed in processing order. Each one raises the watermark
//! to its identifier's numeric suffix, when it has one, and is compared
//! against the index by exact fingerprint equality. Once every directory has been observed, index
//! entries above the watermark are reported as newly published.

use crate::record::{RevisionIndex, record_sequence};
use crate::snapshot::LocalSnapshot;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Highest numeric identifier suffix seen among local snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark(u64);

impl Watermark {
    pub fn value(self) -> u64 {
        self.0
    }

    /// Never lowers the mark.
    pub fn raise(&mut self, sequence: u64) {
        self.0 = self.0.max(sequence);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailable {
    pub identifier: String,
    pub name: String,
    pub path: PathBuf,
    pub local_fingerprint: String,
    pub remote_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub identifier: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub watermark: Watermark,
    pub snapshot_count: usize,
    pub updates: Vec<UpdateAvailable>,
    pub new_records: Vec<NewRecord>,
}

impl ReconcileReport {
    pub fn has_findings(&self) -> bool {
        !self.updates.is_empty() || !self.new_records.is_empty()
    }
}

pub struct Reconciler<'a> {
    index: &'a RevisionIndex,
    watermark: Watermark,
    snapshot_count: usize,
    updates: Vec<UpdateAvailable>,
}

impl<'a> Reconciler<'a> {
    pub fn new(index: &'a RevisionIndex) -> Self {
        Self {
            index,
            watermark: Watermark::default(),
            snapshot_count: 0,
            updates: Vec::new(),
        }
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn observe(&mut self, snapshot: &LocalSnapshot) {
        self.snapshot_count += 1;
        if let Some(sequence) = snapshot.sequence {
            self.watermark.raise(sequence);
        }

        // Absent from the index means out of the document's scope, not removed.
        let Some(remote) = self.index.get(&snapshot.identifier) else {
            debug!(identifier = %snapshot.identifier, "snapshot not in fetched document");
            return;
        };
        if remote.revision_fingerprint != snapshot.revision_fingerprint {
            self.updates.push(UpdateAvailable {
                identifier: snapshot.identifier.clone(),
                name: snapshot.name.clone(),
                path: snapshot.path.clone(),
                local_fingerprint: snapshot.revision_fingerprint.clone(),
                remote_fingerprint: remote.revision_fingerprint.clone(),
            });
        }
    }

    pub fn observe_all<'s>(&mut self, snapshots: impl IntoIterator<Item = &'s LocalSnapshot>) {
        for snapshot in snapshots {
            self.observe(snapshot);
        }
    }

    pub fn finish(self) -> ReconcileReport {
        let watermark = self.watermark;
        let mut fresh: Vec<(u64, NewRecord)> = self
            .index
            .iter()
            .filter_map(|record| {
                let sequence = record_sequence(&record.identifier)?;
                (sequence > watermark.value()).then(|| {
                    (
                        sequence,
                        NewRecord {
                            identifier: record.identifier.clone(),
                            name: record.name.clone(),
                        },
                    )
                })
            })
            .collect();
        fresh.sort_by(|(a_seq, a), (b_seq, b)| {
            a_seq.cmp(b_seq).then_with(|| a.identifier.cmp(&b.identifier))
        });

        ReconcileReport {
            watermark,
            snapshot_count: self.snapshot_count,
            updates: self.updates,
            new_records: fresh.into_iter().map(|(_, record)| record).collect(),
        }
    }
}
