//! End-to-end curation run.
//!
//! Stages run sequentially and fully in memory. Artifacts are written only
//! after every stage has completed and the artifact names are known to be
//! collision-free.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::balance::{
    BackfillSelection, BalancedSet, ViableSet, balance_classes, filter_viable, select_backfill,
};
use crate::config::CurationConfig;
use crate::constants::artifacts::ALL_SPLITS;
use crate::data::{Corpus, has_source, label_counts};
use crate::errors::CurationError;
use crate::export::{
    ArtifactNamer, ClassExport, OutputLayout, export_class_artifacts, write_atomic,
    write_records_file,
};
use crate::ingestion::{IngestionOutcome, ProvenanceManifest, ingest};
use crate::metadata::{MetadataTable, aggregate, report_low_confidence, write_metadata};
use crate::metrics::{LabelSkew, label_skew};
use crate::splits::{SplitLabel, StratifiedSplit, stratified_split};
use crate::tiers::{ConfidenceTiers, split_by_confidence};
use crate::types::{Label, LogMessage};

/// In-memory result of stages 2–7.
#[derive(Clone, Debug)]
pub struct CurationOutcome {
    /// High-confidence set and reserve.
    pub tiers: ConfidenceTiers,
    /// Capped high-confidence set before the viability filter.
    pub balanced: BalancedSet,
    /// Advisory candidates per under-filled label.
    pub backfill: Vec<BackfillSelection>,
    /// Balanced set after the viability filter; the split input.
    pub viable: ViableSet,
    /// Train/validation/test partition of the viable set.
    pub split: StratifiedSplit,
    /// Metadata per split, in `ALL_SPLITS` order.
    pub split_metadata: IndexMap<SplitLabel, MetadataTable>,
    /// Metadata of the viable balanced set.
    pub balanced_metadata: MetadataTable,
    /// Whether the corpus carries source tags; fixes the schema of every artifact.
    pub has_source: bool,
    /// Every warning raised while curating.
    pub warnings: Vec<LogMessage>,
}

/// Summary of one run, also written as `report.json`.
#[derive(Clone, Debug, Serialize)]
pub struct CurationReport {
    /// UTC time the report was built.
    pub generated_at: DateTime<Utc>,
    /// Validated configuration of the run.
    pub config: CurationConfig,
    /// Batch files read.
    pub batches: usize,
    /// Rows read before dedup.
    pub rows_read: usize,
    /// Rows dropped as duplicate text.
    pub duplicates_removed: usize,
    /// Unique records after dedup.
    pub corpus_size: usize,
    /// Records at or above the confidence threshold.
    pub high_confidence: usize,
    /// Records in the low-confidence reserve.
    pub reserve: usize,
    /// Records removed by the cap, per label.
    pub capped: IndexMap<Label, usize>,
    /// Records in the balanced set before the viability filter.
    pub balanced_size: usize,
    /// Backfill quotas per label.
    pub backfill: Vec<BackfillSelection>,
    /// Labels dropped by the viability filter with their counts.
    pub dropped_labels: IndexMap<Label, usize>,
    /// Records per split.
    pub split_sizes: IndexMap<SplitLabel, usize>,
    /// Skew of the viable balanced set.
    pub label_skew: Option<LabelSkew>,
    /// Balanced per-label files written.
    pub class_artifacts: usize,
    /// Backfill candidate files written.
    pub missing_artifacts: usize,
    /// Warnings raised during the run.
    pub warnings: Vec<LogMessage>,
}

/// Runs every curation stage under one validated configuration.
#[derive(Clone, Debug)]
pub struct CurationPipeline {
    config: CurationConfig,
}

impl CurationPipeline {
    /// Validate `config` and build a pipeline.
    pub fn new(config: CurationConfig) -> Result<Self, CurationError> {
        Ok(Self {
            config: config.validated()?,
        })
    }

    /// Configuration every stage runs under.
    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    /// Tier, balance, backfill, filter, split, and aggregate a corpus.
    pub fn curate(&self, corpus: &Corpus) -> CurationOutcome {
        let config = &self.config;
        let tiers = split_by_confidence(corpus.records(), config.confidence_threshold);
        for (label, count) in tiers.reserve_counts() {
            debug!("[curate] label '{}': {} record(s) below threshold", label, count);
        }

        let balanced = balance_classes(&tiers.high, config.per_class_cap);
        let backfill = select_backfill(&balanced.records, &tiers.reserve, config);
        let viable = filter_viable(&balanced.records, config.min_class_size_for_split);
        let split = stratified_split(&viable.records, config);

        let mut warnings = Vec::new();
        let with_source = has_source(corpus.records());
        let split_metadata: IndexMap<SplitLabel, MetadataTable> = ALL_SPLITS
            .iter()
            .map(|label| (*label, aggregate(split.get(*label), with_source)))
            .collect();
        let balanced_metadata = aggregate(&viable.records, with_source);
        if !corpus.is_empty() && !with_source {
            let message =
                "no source attribute on curated records; metadata omits source percentages"
                    .to_string();
            warn!("[curate] {}", message);
            warnings.push(message);
        }
        for label in split.labels_without_train() {
            warnings.push(format!(
                "label '{label}' has no training records after the stratified split"
            ));
        }
        warnings.extend(report_low_confidence(
            &balanced_metadata,
            config.low_confidence_warning,
        ));
        if warnings.is_empty() {
            info!(
                "[curate] all labels have average confidence >= {:.2}",
                config.low_confidence_warning
            );
        }

        CurationOutcome {
            tiers,
            balanced,
            backfill,
            viable,
            split,
            split_metadata,
            balanced_metadata,
            has_source: with_source,
            warnings,
        }
    }

    /// Ingest every batch under `manifest`, curate, and write all artifacts under `layout`.
    pub fn run(
        &self,
        manifest: &ProvenanceManifest,
        layout: &OutputLayout,
    ) -> Result<CurationReport, CurationError> {
        info!("[curate] stage 1: ingest and deduplicate");
        let ingestion = ingest(manifest)?;
        info!("[curate] stages 2-7: tier, balance, backfill, filter, split, aggregate");
        let outcome = self.curate(&ingestion.corpus);

        let namer = ArtifactNamer::for_labels(
            outcome
                .balanced
                .records
                .iter()
                .map(|record| record.label.as_str())
                .chain(outcome.backfill.iter().map(|selection| selection.label.as_str())),
        )?;

        info!("[curate] stage 8: write artifacts to {}", layout.root().display());
        let with_source = outcome.has_source;
        write_records_file(&layout.combined(), ingestion.corpus.records(), with_source)?;
        let class_export = export_class_artifacts(
            layout,
            &namer,
            &outcome.balanced.records,
            &outcome.backfill,
            with_source,
        )?;
        for label in ALL_SPLITS {
            write_records_file(
                &layout.split_records(label),
                outcome.split.get(label),
                with_source,
            )?;
        }
        for (label, table) in &outcome.split_metadata {
            write_atomic(&layout.split_metadata(*label), |writer| {
                write_metadata(table, writer)
            })?;
        }
        write_atomic(&layout.balanced_metadata(), |writer| {
            write_metadata(&outcome.balanced_metadata, writer)
        })?;

        let report = build_report(&self.config, &ingestion, outcome, class_export);
        write_atomic(&layout.report(), |writer| {
            serde_json::to_writer_pretty(writer, &report).map_err(CurationError::from)
        })?;

        if report.warnings.is_empty() {
            info!("[curate] run complete without warnings");
        } else {
            warn!("[curate] run complete with {} warning(s):", report.warnings.len());
            for message in &report.warnings {
                warn!("[curate]   - {}", message);
            }
        }
        Ok(report)
    }
}

fn build_report(
    config: &CurationConfig,
    ingestion: &IngestionOutcome,
    outcome: CurationOutcome,
    class_export: ClassExport,
) -> CurationReport {
    let split_sizes = ALL_SPLITS
        .iter()
        .map(|label| (*label, outcome.split.get(*label).len()))
        .collect();
    CurationReport {
        generated_at: Utc::now(),
        config: config.clone(),
        batches: ingestion.batches,
        rows_read: ingestion.rows_read,
        duplicates_removed: ingestion.duplicates_removed,
        corpus_size: ingestion.corpus.len(),
        high_confidence: outcome.tiers.high.len(),
        reserve: outcome.tiers.reserve.len(),
        capped: outcome.balanced.capped,
        balanced_size: outcome.balanced.records.len(),
        label_skew: label_skew(&label_counts(&outcome.viable.records)),
        backfill: outcome.backfill,
        dropped_labels: outcome.viable.dropped,
        split_sizes,
        class_artifacts: class_export.class_files,
        missing_artifacts: class_export.missing_files,
        warnings: outcome.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, SourceTag};

    #[test]
    fn curate_runs_all_stages_in_memory() {
        let mut records = Vec::new();
        for idx in 0..30 {
            records.push(Record::new(
                format!("a{idx}"),
                "A",
                0.9,
                Some(SourceTag::Synthetic),
            ));
        }
        for idx in 0..5 {
            records.push(Record::new(
                format!("a-low{idx}"),
                "A",
                0.1,
                Some(SourceTag::Natural),
            ));
        }
        records.push(Record::new("c0", "C", 0.5, Some(SourceTag::Manual)));
        let pipeline = CurationPipeline::new(CurationConfig {
            per_class_cap: 40,
            ..CurationConfig::default()
        })
        .unwrap();
        let outcome = pipeline.curate(&Corpus::from_records(records));

        assert_eq!(outcome.tiers.reserve.len(), 5);
        assert!(outcome.balanced.capped.is_empty());
        assert_eq!(outcome.balanced.records.len(), 31);
        assert_eq!(outcome.backfill.len(), 1);
        assert_eq!(outcome.backfill[0].label, "A");
        assert_eq!(outcome.backfill[0].deficit, 10);
        assert_eq!(outcome.backfill[0].candidates.len(), 5);
        assert_eq!(outcome.viable.dropped.get("C"), Some(&1));
        assert_eq!(outcome.split.len(), 30);
        assert_eq!(outcome.split.train.len(), 24);
        assert!(outcome.balanced_metadata.row("C").is_none());
        assert_eq!(outcome.balanced_metadata.row("A").unwrap().num_samples, 30);
        assert!(outcome.has_source);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn empty_splits_keep_the_source_breakdown() {
        let corpus = Corpus::from_records([
            Record::new("first", "A", 0.9, Some(SourceTag::Synthetic)),
            Record::new("second", "A", 0.8, Some(SourceTag::Synthetic)),
        ]);
        let outcome = CurationPipeline::new(CurationConfig::default())
            .unwrap()
            .curate(&corpus);
        assert!(outcome.split.train.is_empty());
        for table in outcome.split_metadata.values() {
            assert!(table.has_source);
        }
        assert!(outcome.balanced_metadata.has_source);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let err = CurationPipeline::new(CurationConfig {
            validation_fraction: -0.1,
            ..CurationConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, CurationError::Configuration(_)));
    }
}
