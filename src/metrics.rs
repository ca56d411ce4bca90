use indexmap::IndexMap;
use serde::Serialize;

use crate::types::Label;

/// Aggregate skew metrics for per-label sample counts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabelSkew {
    /// Records across all labels.
    pub total: usize,
    /// Distinct labels.
    pub labels: usize,
    /// Smallest label count.
    pub min: usize,
    /// Largest label count.
    pub max: usize,
    /// Mean records per label.
    pub mean: f64,
    /// Share of the largest label.
    pub max_share: f64,
    /// Share of the smallest label.
    pub min_share: f64,
    /// `max / min`; `None` when a label has zero records.
    pub ratio: Option<f64>,
    /// Per-label shares, largest first.
    pub per_label: Vec<LabelShare>,
}

/// Per-label share of a record set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabelShare {
    /// Category label.
    pub label: Label,
    /// Records carrying the label.
    pub count: usize,
    /// Fraction of all records.
    pub share: f64,
}

/// Compute skew metrics from per-label counts. Largest labels come first.
pub fn label_skew(counts: &IndexMap<Label, usize>) -> Option<LabelSkew> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: usize = counts.values().sum();
    let labels = counts.len();
    let share_of = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let mut per_label: Vec<LabelShare> = counts
        .iter()
        .map(|(label, count)| LabelShare {
            label: label.clone(),
            count: *count,
            share: share_of(*count),
        })
        .collect();
    per_label.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Some(LabelSkew {
        total,
        labels,
        min,
        max,
        mean: total as f64 / labels as f64,
        max_share: share_of(max),
        min_share: share_of(min),
        ratio: (min > 0).then(|| max as f64 / min as f64),
        per_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_skew_reports_balance() {
        let mut counts = IndexMap::new();
        counts.insert("A".to_string(), 2);
        counts.insert("B".to_string(), 2);
        let skew = label_skew(&counts).expect("skew");
        assert_eq!(skew.total, 4);
        assert_eq!(skew.labels, 2);
        assert!((skew.max_share - 0.5).abs() < 1e-6);
        assert_eq!(skew.ratio, Some(1.0));
        assert!(
            skew.per_label
                .iter()
                .all(|entry| (entry.share - 0.5).abs() < 1e-6)
        );
    }

    #[test]
    fn label_skew_reports_imbalance() {
        let mut counts = IndexMap::new();
        counts.insert("C".to_string(), 50);
        counts.insert("A".to_string(), 2000);
        let skew = label_skew(&counts).expect("skew");
        assert_eq!(skew.min, 50);
        assert_eq!(skew.max, 2000);
        assert_eq!(skew.ratio, Some(40.0));
        assert_eq!(skew.per_label[0].label, "A");
    }

    #[test]
    fn empty_counts_have_no_skew() {
        assert!(label_skew(&IndexMap::new()).is_none());
    }
}
