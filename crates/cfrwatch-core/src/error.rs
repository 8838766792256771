//! Run-level error taxonomy.

use crate::fetch::FetchError;
use crate::normalize::ShapeError;
use crate::snapshot::SnapshotError;
use crate::xml::XmlError;

/// A fatal failure of one check run. No partial report survives it.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The document could not be retrieved.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Bytes arrived but are not well-formed markup.
    #[error("error parsing XML document: {0}")]
    Parse(#[from] XmlError),

    /// Well-formed markup with an unsupported structure.
    #[error("unable to read XML document, unsupported structure: {0}")]
    Shape(#[from] ShapeError),

    /// A local snapshot file is unreadable or incomplete.
    #[error("invalid local snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl CheckError {
    pub fn class(&self) -> &'static str {
        match self {
            CheckError::Fetch(_) => "transport",
            CheckError::Parse(_) => "parse",
            CheckError::Shape(_) => "shape",
            CheckError::Snapshot(_) => "snapshot",
        }
    }
}
