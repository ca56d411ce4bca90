use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::CurationError;
pub use crate::types::{Label, LocationId, RecordText};

/// Producer family a record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Model- or template-generated phrases.
    Synthetic,
    /// Scraped or otherwise naturally occurring text.
    Natural,
    /// Samples approved by a human reviewer.
    Manual,
    /// Provenance could not be resolved.
    Unknown,
}

impl SourceTag {
    /// Canonical lowercase name used in tabular artifacts.
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceTag::Synthetic => "synthetic",
            SourceTag::Natural => "natural",
            SourceTag::Manual => "manual",
            SourceTag::Unknown => "unknown",
        }
    }

    /// Every tag, in artifact column order.
    pub const ALL: [SourceTag; 4] = [
        SourceTag::Synthetic,
        SourceTag::Natural,
        SourceTag::Manual,
        SourceTag::Unknown,
    ];

    /// Parse a tabular `source` cell. Unrecognized values map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        value.parse().unwrap_or(SourceTag::Unknown)
    }

    /// Legacy naming-convention inference for provenance locations.
    pub fn infer_from_name(name: &str) -> Self {
        let lowered = name.to_ascii_lowercase();
        if lowered.contains("synthetic") {
            SourceTag::Synthetic
        } else if lowered.contains("natural") {
            SourceTag::Natural
        } else if lowered.contains("manual") {
            SourceTag::Manual
        } else {
            SourceTag::Unknown
        }
    }
}

/// Strict, case-insensitive parse; unrecognized names are a configuration error.
impl FromStr for SourceTag {
    type Err = CurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        SourceTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let names: Vec<&str> = SourceTag::ALL.iter().map(|tag| tag.as_str()).collect();
                CurationError::Configuration(format!(
                    "unknown source tag '{wanted}' (expected one of: {})",
                    names.join(", ")
                ))
            })
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled text sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Sample text; also the dedup identity.
    pub text: RecordText,
    /// Category label.
    pub label: Label,
    /// Labeling confidence in `[0, 1]`.
    pub confidence: f64,
    /// Producer family, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceTag>,
}

impl Record {
    /// Build a record; callers validate `confidence` beforehand.
    pub fn new(
        text: impl Into<RecordText>,
        label: impl Into<Label>,
        confidence: f64,
        source: Option<SourceTag>,
    ) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
            confidence,
            source,
        }
    }
}

/// Records read from one provenance unit (one producer run).
#[derive(Clone, Debug)]
pub struct Batch {
    /// Provenance location the batch was discovered under.
    pub location: LocationId,
    /// File the batch was read from.
    pub path: PathBuf,
    /// Source tag stamped on records that do not carry their own.
    pub source: SourceTag,
    /// Records in file order.
    pub records: Vec<Record>,
}

/// Deduplicated union of batches. No two records share identical text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Corpus {
    records: Vec<Record>,
}

impl Corpus {
    /// Deduplicate by exact text; the first occurrence wins and keeps its position.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let mut unique: IndexMap<RecordText, Record> = IndexMap::new();
        for record in records {
            unique.entry(record.text.clone()).or_insert(record);
        }
        Self {
            records: unique.into_values().collect(),
        }
    }

    /// Merge batches in the given order.
    pub fn from_batches<'a, I>(batches: I) -> Self
    where
        I: IntoIterator<Item = &'a Batch>,
    {
        Self::from_records(
            batches
                .into_iter()
                .flat_map(|batch| batch.records.iter().cloned()),
        )
    }

    /// Records in first-occurrence order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consume the corpus.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Number of unique records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no record survived ingestion.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// True when at least one record carries a source tag.
pub fn has_source(records: &[Record]) -> bool {
    records.iter().any(|record| record.source.is_some())
}

/// Group records into per-label buckets, labels in sorted order, members in input order.
pub fn label_buckets(records: &[Record]) -> IndexMap<Label, Vec<Record>> {
    let mut buckets: IndexMap<Label, Vec<Record>> = IndexMap::new();
    for record in records {
        buckets
            .entry(record.label.clone())
            .or_default()
            .push(record.clone());
    }
    buckets.sort_keys();
    buckets
}

/// Per-label record counts, labels in sorted order.
pub fn label_counts(records: &[Record]) -> IndexMap<Label, usize> {
    let mut counts: IndexMap<Label, usize> = IndexMap::new();
    for record in records {
        *counts.entry(record.label.clone()).or_insert(0) += 1;
    }
    counts.sort_keys();
    counts
}

/// Stable sort by confidence, highest first. Ties keep their input order.
pub fn sort_by_confidence_desc(records: &mut [Record]) {
    records.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, label: &str, confidence: f64, source: SourceTag) -> Record {
        Record::new(text, label, confidence, Some(source))
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_its_source() {
        let corpus = Corpus::from_records(vec![
            record("alpha", "A", 0.9, SourceTag::Synthetic),
            record("beta", "B", 0.8, SourceTag::Synthetic),
            record("alpha", "C", 0.2, SourceTag::Natural),
        ]);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.records()[0].label, "A");
        assert_eq!(corpus.records()[0].source, Some(SourceTag::Synthetic));
        assert_eq!(corpus.records()[1].text, "beta");
    }

    #[test]
    fn dedup_is_case_and_whitespace_sensitive() {
        let corpus = Corpus::from_records(vec![
            record("Alpha", "A", 0.9, SourceTag::Natural),
            record("alpha", "A", 0.9, SourceTag::Natural),
            record("alpha ", "A", 0.9, SourceTag::Natural),
        ]);
        assert_eq!(corpus.len(), 3);
    }

    #[test]
    fn dedup_is_a_fixed_point() {
        let first = Corpus::from_records(vec![
            record("x", "A", 0.5, SourceTag::Natural),
            record("y", "A", 0.6, SourceTag::Manual),
            record("x", "B", 0.7, SourceTag::Synthetic),
        ]);
        let second = Corpus::from_records(first.records().to_vec());
        assert_eq!(first, second);
    }

    #[test]
    fn source_tag_parsing_and_inference() {
        assert_eq!(SourceTag::parse(" Manual "), SourceTag::Manual);
        assert_eq!(SourceTag::parse("zero_shot"), SourceTag::Unknown);
        assert_eq!("NATURAL".parse::<SourceTag>().unwrap(), SourceTag::Natural);
        assert_eq!("unknown".parse::<SourceTag>().unwrap(), SourceTag::Unknown);
        assert!(matches!(
            "zero_shot".parse::<SourceTag>(),
            Err(CurationError::Configuration(_))
        ));
        assert_eq!(
            SourceTag::infer_from_name("output_chunks_synthetic_gpt35"),
            SourceTag::Synthetic
        );
        assert_eq!(
            SourceTag::infer_from_name("output_chunks_natural"),
            SourceTag::Natural
        );
        assert_eq!(SourceTag::infer_from_name("scraped"), SourceTag::Unknown);
    }

    #[test]
    fn confidence_sort_is_stable() {
        let mut records = vec![
            record("a", "L", 0.5, SourceTag::Natural),
            record("b", "L", 0.9, SourceTag::Natural),
            record("c", "L", 0.5, SourceTag::Natural),
        ];
        sort_by_confidence_desc(&mut records);
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a", "c"]);
    }

    #[test]
    fn buckets_are_sorted_by_label() {
        let records = vec![
            record("1", "b", 0.5, SourceTag::Natural),
            record("2", "a", 0.5, SourceTag::Natural),
            record("3", "b", 0.5, SourceTag::Natural),
        ];
        let buckets = label_buckets(&records);
        let labels: Vec<&str> = buckets.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(buckets["b"].len(), 2);
        assert_eq!(label_counts(&records)["b"], 2);
        assert!(has_source(&records));
        assert!(!has_source(&[Record::new("t", "a", 0.5, None)]));
    }
}
