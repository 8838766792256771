//! # cfrwatch-core
//!
//! Detects drift between the published text of 27 CFR part 9 subpart C
//! (approved American viticultural areas) and a local set of GeoJSON
//! boundary snapshots.
//!
//! ## Data flow
//!
//! ```text
//! DocumentFetcher          URL -> bytes (or a status-coded failure)
//!     │
//! xml::parse_document      bytes -> generic XmlTree
//!     │
//! Normalizer               XmlTree -> RevisionIndex (per DocumentShape)
//!     │
//! snapshot::read_directory avas/, tbd/ -> representative LocalSnapshots
//!     │
//! Reconciler               index × snapshots -> updates + new records
//! ```
//!
//! A run is read-only and stateless: every call to [`run_check`] starts from
//! an empty index and a zero watermark.

pub mod check;
pub mod config;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod reconcile;
pub mod record;
pub mod snapshot;
pub mod xml;

pub use check::{CheckOptions, CheckReport, run_check};
pub use config::{CheckConfig, ConfigError, SnapshotConfig, SourceConfig};
pub use error::CheckError;
pub use fetch::{
    DocumentFetcher, DocumentRequest, FetchError, FileFetcher, HttpFetcher, YearError,
    parse_year,
};
pub use normalize::{
    AnnualNormalizer, DocumentShape, HistoricalNormalizer, Normalizer, ShapeError,
    normalize_document,
};
pub use reconcile::{NewRecord, ReconcileReport, Reconciler, UpdateAvailable, Watermark};
pub use record::{CanonicalRecord, RevisionIndex, record_sequence};
pub use snapshot::{
    LocalSnapshot, SecondaryId, SelectionRule, SnapshotError, SnapshotOptions,
    list_snapshot_files, read_directory,
};
pub use xml::{Element, Node, XmlError, XmlTree, parse_document};
