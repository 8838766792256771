//! The one-shot check: fetch, parse, normalise, scan, reconcile.

use crate::config::SnapshotConfig;
use crate::error::CheckError;
use crate::fetch::{DocumentFetcher, DocumentRequest};
use crate::normalize::{DocumentShape, normalize_document};
use crate::reconcile::{NewRecord, Reconciler, UpdateAvailable, Watermark};
use crate::snapshot::{SnapshotOptions, read_directory};
use crate::xml::parse_document;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    /// Scanned in order; the watermark accumulates across all of them.
    pub directories: Vec<PathBuf>,
    pub snapshots: SnapshotOptions,
}

impl CheckOptions {
    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self {
            directories: config.directories.clone(),
            snapshots: config.options(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub shape: DocumentShape,
    pub source: String,
    pub record_count: usize,
    pub directories: Vec<PathBuf>,
    pub snapshot_count: usize,
    pub watermark: Watermark,
    pub updates: Vec<UpdateAvailable>,
    pub new_records: Vec<NewRecord>,
}

impl CheckReport {
    pub fn has_findings(&self) -> bool {
        !self.updates.is_empty() || !self.new_records.is_empty()
    }
}

pub fn run_check(
    fetcher: &dyn DocumentFetcher,
    request: &DocumentRequest,
    options: &CheckOptions,
) -> Result<CheckReport, CheckError> {
    let bytes = fetcher.fetch(&request.url)?;
    let tree = parse_document(&bytes)?;
    let index = normalize_document(&tree, request.shape)?;
    info!(shape = %request.shape, records = index.len(), "built revision index");

    let mut reconciler = Reconciler::new(&index);
    for dir in &options.directories {
        let snapshots = read_directory(dir, &options.snapshots)?;
        info!(
            dir = %dir.display(),
            snapshots = snapshots.len(),
            "scanned snapshot directory"
        );
        reconciler.observe_all(&snapshots);
    }
    let reconciled = reconciler.finish();
    info!(
        watermark = reconciled.watermark.value(),
        updates = reconciled.updates.len(),
        new_records = reconciled.new_records.len(),
        "reconciled snapshots"
    );

    Ok(CheckReport {
        shape: request.shape,
        source: request.url.clone(),
        record_count: index.len(),
        directories: options.directories.clone(),
        snapshot_count: reconciled.snapshot_count,
        watermark: reconciled.watermark,
        updates: reconciled.updates,
        new_records: reconciled.new_records,
    })
}
