//! Per-label quality metadata for splits and the balanced set.

use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::constants::artifacts::{METADATA_BASE_HEADER, METADATA_SOURCE_HEADER};
use crate::constants::curation::METADATA_DECIMALS;
use crate::data::{Record, SourceTag, label_buckets};
use crate::errors::CurationError;
use crate::types::{Label, LogMessage};

/// Fraction of a label's records contributed by each known producer family.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SourceShares {
    /// Share tagged `synthetic`.
    pub pct_synthetic: f64,
    /// Share tagged `natural`.
    pub pct_natural: f64,
    /// Share tagged `manual`.
    pub pct_manual: f64,
}

/// Aggregate statistics for one label within one record set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetadataRow {
    /// Category label.
    pub label: Label,
    /// Records carrying the label.
    pub num_samples: usize,
    /// Mean confidence rounded to three decimals.
    pub avg_confidence: f64,
    /// Present only when the record set carries source tags.
    #[serde(flatten)]
    pub shares: Option<SourceShares>,
}

/// Metadata rows for one record set, labels in sorted order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetadataTable {
    /// One row per label.
    pub rows: Vec<MetadataRow>,
    /// Whether the source breakdown columns are populated.
    pub has_source: bool,
}

impl MetadataTable {
    /// Row for `label`, if present.
    pub fn row(&self, label: &str) -> Option<&MetadataRow> {
        self.rows.iter().find(|row| row.label == label)
    }

    /// True when the record set was empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Group `records` by label and compute counts, mean confidence, and source shares.
///
/// `with_source` selects the schema and is decided once per run, so every
/// table of a run shares the same columns. Without it the reduced schema is
/// produced.
pub fn aggregate(records: &[Record], with_source: bool) -> MetadataTable {
    let rows = label_buckets(records)
        .into_iter()
        .map(|(label, bucket)| {
            let num_samples = bucket.len();
            let total: f64 = bucket.iter().map(|record| record.confidence).sum();
            let share = |tag: SourceTag| {
                let hits = bucket
                    .iter()
                    .filter(|record| record.source == Some(tag))
                    .count();
                round_metadata(hits as f64 / num_samples as f64)
            };
            let shares = with_source.then(|| SourceShares {
                pct_synthetic: share(SourceTag::Synthetic),
                pct_natural: share(SourceTag::Natural),
                pct_manual: share(SourceTag::Manual),
            });
            MetadataRow {
                label,
                num_samples,
                avg_confidence: round_metadata(total / num_samples as f64),
                shares,
            }
        })
        .collect();
    MetadataTable {
        rows,
        has_source: with_source,
    }
}

/// Round to the metadata precision (three decimals).
pub fn round_metadata(value: f64) -> f64 {
    let scale = 10f64.powi(METADATA_DECIMALS);
    (value * scale).round() / scale
}

/// A label whose mean confidence falls below the warning threshold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LowConfidenceWarning {
    /// Flagged label.
    pub label: Label,
    /// Rounded mean confidence.
    pub avg_confidence: f64,
}

impl LowConfidenceWarning {
    /// Human-readable warning line.
    pub fn message(&self, threshold: f64) -> LogMessage {
        format!(
            "label '{}' has average confidence {:.3} (< {:.2})",
            self.label, self.avg_confidence, threshold
        )
    }
}

/// Every row whose mean confidence is below `threshold`.
pub fn low_confidence_labels(table: &MetadataTable, threshold: f64) -> Vec<LowConfidenceWarning> {
    table
        .rows
        .iter()
        .filter(|row| row.avg_confidence < threshold)
        .map(|row| LowConfidenceWarning {
            label: row.label.clone(),
            avg_confidence: row.avg_confidence,
        })
        .collect()
}

/// Serialize a table as CSV, emitting the reduced header when source is absent.
pub fn write_metadata<W: io::Write>(table: &MetadataTable, writer: W) -> Result<(), CurationError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut header: Vec<&str> = METADATA_BASE_HEADER.to_vec();
    if table.has_source {
        header.extend(METADATA_SOURCE_HEADER);
    }
    csv_writer.write_record(&header)?;
    for row in &table.rows {
        let mut fields = vec![
            row.label.clone(),
            row.num_samples.to_string(),
            row.avg_confidence.to_string(),
        ];
        if table.has_source {
            let shares = row.shares.unwrap_or(SourceShares {
                pct_synthetic: 0.0,
                pct_natural: 0.0,
                pct_manual: 0.0,
            });
            fields.extend([
                shares.pct_synthetic.to_string(),
                shares.pct_natural.to_string(),
                shares.pct_manual.to_string(),
            ]);
        }
        csv_writer.write_record(&fields)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Load a metadata artifact written by [`write_metadata`].
pub fn read_metadata(path: &Path) -> Result<MetadataTable, CurationError> {
    if !path.is_file() {
        return Err(CurationError::MetadataMissing {
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|header| header == name);
    let (Some(label_idx), Some(count_idx), Some(avg_idx)) = (
        position(METADATA_BASE_HEADER[0]),
        position(METADATA_BASE_HEADER[1]),
        position(METADATA_BASE_HEADER[2]),
    ) else {
        return Err(CurationError::MissingColumns {
            path: path.to_path_buf(),
            missing: METADATA_BASE_HEADER
                .iter()
                .filter(|name| position(**name).is_none())
                .map(|name| name.to_string())
                .collect(),
        });
    };
    let share_columns: Option<Vec<usize>> = METADATA_SOURCE_HEADER
        .iter()
        .map(|name| position(*name))
        .collect();

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|pos| pos.line()).unwrap_or(0);
        let number = |idx: usize| -> Result<f64, CurationError> {
            let raw = row.get(idx).unwrap_or("");
            raw.trim().parse().map_err(|_| CurationError::InvalidRow {
                path: path.to_path_buf(),
                row: line,
                reason: format!("'{raw}' is not a number"),
            })
        };
        let shares = match &share_columns {
            Some(columns) => Some(SourceShares {
                pct_synthetic: number(columns[0])?,
                pct_natural: number(columns[1])?,
                pct_manual: number(columns[2])?,
            }),
            None => None,
        };
        rows.push(MetadataRow {
            label: row.get(label_idx).unwrap_or("").to_string(),
            num_samples: number(count_idx)? as usize,
            avg_confidence: number(avg_idx)?,
            shares,
        });
    }
    Ok(MetadataTable {
        rows,
        has_source: share_columns.is_some(),
    })
}

/// Log each low-confidence label and return the messages.
pub fn report_low_confidence(table: &MetadataTable, threshold: f64) -> Vec<LogMessage> {
    let flagged = low_confidence_labels(table, threshold);
    if !flagged.is_empty() {
        warn!(
            "[curate] {} label(s) have average confidence below {:.2}",
            flagged.len(),
            threshold
        );
    }
    flagged
        .iter()
        .map(|entry| {
            let message = entry.message(threshold);
            warn!("[curate] {}", message);
            message
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::has_source;
    use tempfile::tempdir;

    fn sourced(text: &str, label: &str, confidence: f64, tag: SourceTag) -> Record {
        Record::new(text, label, confidence, Some(tag))
    }

    #[test]
    fn aggregate_computes_shares_over_label_count() {
        let records = vec![
            sourced("1", "A", 0.9, SourceTag::Synthetic),
            sourced("2", "A", 0.8, SourceTag::Natural),
            sourced("3", "A", 0.7, SourceTag::Natural),
            sourced("4", "B", 0.6, SourceTag::Unknown),
        ];
        let table = aggregate(&records, has_source(&records));
        assert!(table.has_source);
        let a = table.row("A").unwrap();
        assert_eq!(a.num_samples, 3);
        assert_eq!(a.avg_confidence, 0.8);
        let shares = a.shares.unwrap();
        assert_eq!(shares.pct_synthetic, 0.333);
        assert_eq!(shares.pct_natural, 0.667);
        assert_eq!(shares.pct_manual, 0.0);
        let b = table.row("B").unwrap().shares.unwrap();
        assert_eq!(b.pct_synthetic + b.pct_natural + b.pct_manual, 0.0);
    }

    #[test]
    fn missing_source_degrades_to_reduced_schema() {
        let records = vec![
            Record::new("1", "A", 0.5, None),
            Record::new("2", "A", 0.6, None),
        ];
        let table = aggregate(&records, has_source(&records));
        assert!(!table.has_source);
        assert!(table.rows[0].shares.is_none());

        let mut buffer = Vec::new();
        write_metadata(&table, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "label,num_samples,avg_confidence\nA,2,0.55\n");
    }

    #[test]
    fn run_wide_schema_applies_to_empty_and_untagged_sets() {
        let empty = aggregate(&[], true);
        assert!(empty.has_source);
        let mut buffer = Vec::new();
        write_metadata(&empty, &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "label,num_samples,avg_confidence,pct_synthetic,pct_natural,pct_manual\n"
        );

        let untagged = aggregate(&[Record::new("1", "A", 0.5, None)], true);
        let shares = untagged.row("A").unwrap().shares.unwrap();
        assert_eq!(shares.pct_synthetic + shares.pct_natural + shares.pct_manual, 0.0);
    }

    #[test]
    fn low_confidence_labels_are_flagged() {
        let records = vec![
            Record::new("1", "A", 0.74, None),
            Record::new("2", "B", 0.75, None),
        ];
        let table = aggregate(&records, false);
        let flagged = low_confidence_labels(&table, 0.75);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].label, "A");
        assert_eq!(report_low_confidence(&table, 0.75).len(), 1);
    }

    #[test]
    fn metadata_survives_a_file_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metadata_balanced.csv");
        let table = aggregate(
            &[
                sourced("1", "Home, Garden", 0.9, SourceTag::Manual),
                sourced("2", "IAB1", 0.4, SourceTag::Synthetic),
            ],
            true,
        );
        let file = std::fs::File::create(&path).unwrap();
        write_metadata(&table, file).unwrap();
        assert_eq!(read_metadata(&path).unwrap(), table);
    }

    #[test]
    fn reading_absent_metadata_is_fatal() {
        let temp = tempdir().unwrap();
        let err = read_metadata(&temp.path().join("metadata_balanced.csv")).unwrap_err();
        assert!(matches!(err, CurationError::MetadataMissing { .. }));
    }
}
