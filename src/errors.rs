use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ArtifactId, Label};

/// Error type for ingestion, configuration, and artifact failures.
#[derive(Debug, Error)]
pub enum CurationError {
    /// No batch file was found under any provenance location.
    #[error("no input batches found under {locations} provenance location(s)")]
    NoInputBatches {
        /// Locations that were scanned.
        locations: usize,
    },
    /// A tabular input lacks a required column.
    #[error("batch '{}' is missing required column(s): {}", path.display(), missing.join(", "))]
    MissingColumns {
        /// Offending file.
        path: PathBuf,
        /// Required columns not present in its header.
        missing: Vec<String>,
    },
    /// A row could not be parsed.
    #[error("batch '{}' row {row}: {reason}", path.display())]
    InvalidRow {
        /// Offending file.
        path: PathBuf,
        /// 1-based line number within the file.
        row: u64,
        /// What was wrong with the row.
        reason: String,
    },
    /// A provenance location or one of its subdirectories could not be read.
    #[error("provenance location '{}' is unavailable: {reason}", path.display())]
    LocationUnavailable {
        /// Path that failed.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },
    /// A metadata artifact was inspected before any run produced it.
    #[error("metadata artifact '{}' not found; run curation first", path.display())]
    MetadataMissing {
        /// Expected artifact path.
        path: PathBuf,
    },
    /// Distinct labels sanitize to the same artifact id.
    #[error("labels {labels:?} all map to artifact id '{artifact}'")]
    ArtifactCollision {
        /// Shared artifact id.
        artifact: ArtifactId,
        /// Colliding labels, sorted.
        labels: Vec<Label>,
    },
    /// Invalid configuration or CLI value.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// CSV read or write failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// JSON report serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
