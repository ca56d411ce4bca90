use indexmap::IndexMap;
use tracing::info;

use crate::data::{Record, label_counts};
use crate::types::Label;

/// Strict partition of a corpus by confidence threshold.
#[derive(Clone, Debug, Default)]
pub struct ConfidenceTiers {
    /// Records with `confidence >= threshold`, in corpus order.
    pub high: Vec<Record>,
    /// Records with `confidence < threshold`, in corpus order.
    pub reserve: Vec<Record>,
}

impl ConfidenceTiers {
    /// Per-label count of records held back in the reserve.
    pub fn reserve_counts(&self) -> IndexMap<Label, usize> {
        label_counts(&self.reserve)
    }
}

/// Partition `records` into the high-confidence set and the low-confidence reserve.
pub fn split_by_confidence(records: &[Record], threshold: f64) -> ConfidenceTiers {
    let (high, reserve): (Vec<Record>, Vec<Record>) = records
        .iter()
        .cloned()
        .partition(|record| record.confidence >= threshold);
    info!(
        "[curate] confidence threshold {:.2}: {} high-confidence, {} held in reserve",
        threshold,
        high.len(),
        reserve.len()
    );
    ConfidenceTiers { high, reserve }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inclusive_on_the_high_side() {
        let records = vec![
            Record::new("a", "A", 0.40, None),
            Record::new("b", "A", 0.3999, None),
            Record::new("c", "B", 1.0, None),
            Record::new("d", "B", 0.0, None),
        ];
        let tiers = split_by_confidence(&records, 0.40);
        let high: Vec<&str> = tiers.high.iter().map(|r| r.text.as_str()).collect();
        let low: Vec<&str> = tiers.reserve.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(high, vec!["a", "c"]);
        assert_eq!(low, vec!["b", "d"]);
        assert_eq!(tiers.high.len() + tiers.reserve.len(), records.len());
        assert_eq!(tiers.reserve_counts()["A"], 1);
    }
}
