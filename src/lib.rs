#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Class balancing, backfill selection, and the viability floor.
pub mod balance;
/// Command-line runners shared by the `curate` binary.
pub mod cli;
/// Curation configuration.
pub mod config;
/// Centralized constants for policies, input columns, and artifact layout.
pub mod constants;
/// Record, batch, and corpus types.
pub mod data;
/// Artifact layout and atomic writers.
pub mod export;
/// Batch discovery, parsing, and dedup merge.
pub mod ingestion;
/// Per-label metadata aggregation and low-confidence flags.
pub mod metadata;
/// Label skew metrics.
pub mod metrics;
/// End-to-end pipeline and run report.
pub mod pipeline;
/// Stratified train/validation/test splitting.
pub mod splits;
/// Confidence tier partition.
pub mod tiers;
/// Input transports (filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Label sanitization helpers.
pub mod utils;

mod errors;

pub use balance::{BackfillSelection, BalancedSet, ViableSet};
pub use config::CurationConfig;
pub use data::{Batch, Corpus, Record, SourceTag};
pub use errors::CurationError;
pub use export::{ArtifactNamer, OutputLayout};
pub use ingestion::{IngestionOutcome, ProvenanceLocation, ProvenanceManifest};
pub use metadata::{MetadataRow, MetadataTable, SourceShares};
pub use pipeline::{CurationOutcome, CurationPipeline, CurationReport};
pub use splits::{SplitLabel, StratifiedSplit};
pub use tiers::ConfidenceTiers;
pub use types::{ArtifactId, Label, LocationId, LogMessage, RecordText};
