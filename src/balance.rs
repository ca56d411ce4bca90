//! Class balancing, backfill candidate selection, and the viability floor.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::CurationConfig;
use crate::data::{Record, label_buckets, label_counts, sort_by_confidence_desc};
use crate::types::Label;

/// High-confidence records capped per label.
#[derive(Clone, Debug, Default)]
pub struct BalancedSet {
    /// Labels in sorted order, each sorted by confidence descending.
    pub records: Vec<Record>,
    /// Records removed by the cap, per label (only labels that lost records).
    pub capped: IndexMap<Label, usize>,
}

/// Keep at most `cap` highest-confidence records per label.
///
/// Ties keep ingestion order. Labels under the cap pass through unchanged.
pub fn balance_classes(high: &[Record], cap: usize) -> BalancedSet {
    let mut balanced = BalancedSet::default();
    for (label, mut bucket) in label_buckets(high) {
        sort_by_confidence_desc(&mut bucket);
        if bucket.len() > cap {
            let removed = bucket.len() - cap;
            info!(
                "[curate] label '{}': capped {} -> {} ({} removed)",
                label,
                bucket.len(),
                cap,
                removed
            );
            bucket.truncate(cap);
            balanced.capped.insert(label, removed);
        }
        balanced.records.extend(bucket);
    }
    balanced
}

/// Advisory low-confidence candidates for one under-represented label.
#[derive(Clone, Debug, Serialize)]
pub struct BackfillSelection {
    /// Label that fell short of the cap.
    pub label: Label,
    /// Balanced count before backfill.
    pub balanced_count: usize,
    /// `cap - balanced_count`.
    pub deficit: usize,
    /// `deficit * backfill_multiplier`.
    pub quota: usize,
    /// Reserve records ranked by confidence, at most `quota`.
    #[serde(skip)]
    pub candidates: Vec<Record>,
}

/// Rank reserve records for every label below the cap.
///
/// Candidates are never merged into the balanced set. Labels with no reserve
/// records produce no selection.
pub fn select_backfill(
    balanced: &[Record],
    reserve: &[Record],
    config: &CurationConfig,
) -> Vec<BackfillSelection> {
    let cap = config.per_class_cap;
    let mut counts = label_counts(balanced);
    if config.backfill_absent_labels {
        for record in reserve {
            counts.entry(record.label.clone()).or_insert(0);
        }
        counts.sort_keys();
    }
    let mut pool = label_buckets(reserve);

    let mut selections = Vec::new();
    for (label, balanced_count) in counts {
        if balanced_count >= cap {
            continue;
        }
        let deficit = cap - balanced_count;
        let quota = deficit.saturating_mul(config.backfill_multiplier);
        let Some(mut candidates) = pool.swap_remove(&label) else {
            debug!("[curate] label '{}': no reserve candidates for backfill", label);
            continue;
        };
        sort_by_confidence_desc(&mut candidates);
        candidates.truncate(quota);
        if candidates.is_empty() {
            continue;
        }
        info!(
            "[curate] label '{}': deficit {}, quota {}, {} backfill candidate(s)",
            label,
            deficit,
            quota,
            candidates.len()
        );
        selections.push(BackfillSelection {
            label,
            balanced_count,
            deficit,
            quota,
            candidates,
        });
    }
    selections
}

/// Balanced records of labels large enough to split.
#[derive(Clone, Debug, Default)]
pub struct ViableSet {
    /// Records of every label at or above the floor.
    pub records: Vec<Record>,
    /// Dropped labels with their balanced counts.
    pub dropped: IndexMap<Label, usize>,
}

/// Drop every label with fewer than `min_size` records.
pub fn filter_viable(balanced: &[Record], min_size: usize) -> ViableSet {
    let counts = label_counts(balanced);
    let dropped: IndexMap<Label, usize> = counts
        .into_iter()
        .filter(|(_, count)| *count < min_size)
        .collect();
    for (label, count) in &dropped {
        info!(
            "[curate] label '{}' dropped: {} record(s) < minimum {} for stratified split",
            label, count, min_size
        );
    }
    let records = balanced
        .iter()
        .filter(|record| !dropped.contains_key(&record.label))
        .cloned()
        .collect();
    ViableSet { records, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(label: &str, confidences: &[f64]) -> Vec<Record> {
        confidences
            .iter()
            .enumerate()
            .map(|(idx, confidence)| Record::new(format!("{label}-{idx}"), label, *confidence, None))
            .collect()
    }

    #[test]
    fn cap_keeps_highest_confidence_with_stable_ties() {
        let high = records("A", &[0.5, 0.9, 0.7, 0.9, 0.6]);
        let balanced = balance_classes(&high, 3);
        let texts: Vec<&str> = balanced.records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["A-1", "A-3", "A-2"]);
        assert_eq!(balanced.capped["A"], 2);
    }

    #[test]
    fn labels_under_cap_pass_through() {
        let mut high = records("B", &[0.6, 0.8]);
        high.extend(records("A", &[0.7]));
        let balanced = balance_classes(&high, 5);
        assert_eq!(balanced.records.len(), 3);
        assert!(balanced.capped.is_empty());
        assert_eq!(balanced.records[0].label, "A");
    }

    #[test]
    fn backfill_quota_is_bounded_by_multiplier() {
        let config = CurationConfig {
            per_class_cap: 4,
            backfill_multiplier: 2,
            ..CurationConfig::default()
        };
        let balanced = records("A", &[0.9, 0.8, 0.7]);
        let reserve: Vec<Record> = records("A", &[0.1, 0.3, 0.2, 0.35])
            .into_iter()
            .map(|mut r| {
                r.text.push_str("-low");
                r
            })
            .collect();
        let selections = select_backfill(&balanced, &reserve, &config);
        assert_eq!(selections.len(), 1);
        let selection = &selections[0];
        assert_eq!(selection.deficit, 1);
        assert_eq!(selection.quota, 2);
        let confidences: Vec<f64> = selection.candidates.iter().map(|r| r.confidence).collect();
        assert_eq!(confidences, vec![0.35, 0.3]);
    }

    #[test]
    fn labels_at_cap_or_without_candidates_are_skipped() {
        let config = CurationConfig {
            per_class_cap: 2,
            ..CurationConfig::default()
        };
        let mut balanced = records("A", &[0.9, 0.8]);
        balanced.extend(records("B", &[0.9]));
        let reserve = vec![Record::new("low-a", "A", 0.1, None)];
        assert!(select_backfill(&balanced, &reserve, &config).is_empty());
    }

    #[test]
    fn absent_labels_backfill_only_when_enabled() {
        let balanced = records("A", &[0.9]);
        let reserve = vec![Record::new("low-z", "Z", 0.2, None)];
        let default = CurationConfig {
            per_class_cap: 2,
            ..CurationConfig::default()
        };
        assert!(select_backfill(&balanced, &reserve, &default).is_empty());

        let enabled = CurationConfig {
            backfill_absent_labels: true,
            ..default
        };
        let selections = select_backfill(&balanced, &reserve, &enabled);
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].label, "Z");
        assert_eq!(selections[0].deficit, 2);
        assert_eq!(selections[0].quota, 4);
    }

    #[test]
    fn viability_drops_singletons() {
        let mut balanced = records("A", &[0.9, 0.8]);
        balanced.extend(records("C", &[0.9]));
        let viable = filter_viable(&balanced, 2);
        assert_eq!(viable.records.len(), 2);
        assert_eq!(viable.dropped.get("C"), Some(&1));
        assert!(viable.records.iter().all(|r| r.label == "A"));
    }
}
