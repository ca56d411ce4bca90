//! Two-stage stratified train/validation/test splitting.

use std::fmt;

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::CurationConfig;
use crate::constants::curation::VALIDATION_SEED_OFFSET;
use crate::data::{Record, label_counts};
use crate::types::Label;

/// Logical dataset partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
    /// Test split.
    Test,
}

impl SplitLabel {
    /// Stem used for split and metadata artifact names (`val` for validation).
    pub const fn artifact_stem(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "val",
            SplitLabel::Test => "test",
        }
    }

    /// File name of the split's record artifact.
    pub fn records_filename(self) -> String {
        format!("{}.csv", self.artifact_stem())
    }

    /// File name of the split's metadata artifact.
    pub fn metadata_filename(self) -> String {
        format!("metadata_{}.csv", self.artifact_stem())
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "validation",
            SplitLabel::Test => "test",
        })
    }
}

/// Exact partition of the viable balanced set.
#[derive(Clone, Debug, Default)]
pub struct StratifiedSplit {
    /// Training records.
    pub train: Vec<Record>,
    /// Validation records.
    pub validation: Vec<Record>,
    /// Test records.
    pub test: Vec<Record>,
}

impl StratifiedSplit {
    /// Records of one split.
    pub fn get(&self, label: SplitLabel) -> &[Record] {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }

    /// Records across all three splits.
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// True when every split is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Labels present in the split set with no training records.
    pub fn labels_without_train(&self) -> Vec<Label> {
        let train = label_counts(&self.train);
        let mut labels: Vec<Label> = label_counts(&self.validation)
            .into_keys()
            .chain(label_counts(&self.test).into_keys())
            .filter(|label| !train.contains_key(label))
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}

/// Carve test, then validation from the remainder, stratified by label each time.
///
/// Output splits keep the input's relative record order.
pub fn stratified_split(records: &[Record], config: &CurationConfig) -> StratifiedSplit {
    let mut rng = DeterministicRng::new(config.random_seed);
    let (train_val, test) = stratified_carve(records.to_vec(), config.test_fraction, &mut rng);
    let mut rng = DeterministicRng::new(config.random_seed ^ VALIDATION_SEED_OFFSET);
    let (train, validation) = stratified_carve(train_val, config.validation_fraction, &mut rng);
    let split = StratifiedSplit {
        train,
        validation,
        test,
    };
    info!(
        "[curate] stratified split: train={}, validation={}, test={}",
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );
    for label in split.labels_without_train() {
        warn!(
            "[curate] label '{}' has no training records after the stratified split",
            label
        );
    }
    split
}

/// Split `records` into `(kept, carved)` where `carved` holds
/// `ceil(fraction * n)` records allocated across labels in proportion to
/// their size.
pub fn stratified_carve(
    records: Vec<Record>,
    fraction: f64,
    rng: &mut DeterministicRng,
) -> (Vec<Record>, Vec<Record>) {
    let total = records.len();
    let target = carve_size(total, fraction);
    if target == 0 {
        return (records, Vec::new());
    }

    let mut members: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (idx, record) in records.iter().enumerate() {
        members.entry(record.label.as_str()).or_default().push(idx);
    }
    members.sort_keys();
    let sizes: Vec<usize> = members.values().map(Vec::len).collect();
    let allocation = allocate_proportional(&sizes, target);

    let mut carved_mask = vec![false; total];
    for (indices, take) in members.values_mut().zip(allocation) {
        indices.shuffle(rng);
        for idx in indices.iter().take(take) {
            carved_mask[*idx] = true;
        }
    }

    let mut kept = Vec::with_capacity(total - target);
    let mut carved = Vec::with_capacity(target);
    for (record, is_carved) in records.into_iter().zip(carved_mask) {
        if is_carved {
            carved.push(record);
        } else {
            kept.push(record);
        }
    }
    (kept, carved)
}

/// Number of records a carve of `fraction` takes from `total`.
pub fn carve_size(total: usize, fraction: f64) -> usize {
    if total == 0 || fraction <= 0.0 {
        return 0;
    }
    // Nudge below the boundary so 0.1 * 70 does not ceil to 8.
    let raw = (fraction * total as f64 - 1e-9).ceil();
    (raw.max(0.0) as usize).min(total)
}

/// Distribute `target` slots across groups of `sizes` by largest remainder.
///
/// Each group gets `floor(size * target / total)`; leftover slots go to the
/// largest remainders, ties to the larger group then the earlier group.
pub fn allocate_proportional(sizes: &[usize], target: usize) -> Vec<usize> {
    let total: usize = sizes.iter().sum();
    if total == 0 {
        return vec![0; sizes.len()];
    }
    let target = target.min(total);
    let mut allocation = Vec::with_capacity(sizes.len());
    let mut remainders = Vec::with_capacity(sizes.len());
    for (idx, size) in sizes.iter().enumerate() {
        let scaled = *size as u128 * target as u128;
        allocation.push((scaled / total as u128) as usize);
        remainders.push((scaled % total as u128, *size, idx));
    }
    let leftover = target - allocation.iter().sum::<usize>();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
    for (_, _, idx) in remainders.into_iter().take(leftover) {
        allocation[idx] += 1;
    }
    allocation
}

#[derive(Debug, Clone)]
/// Small deterministic RNG used for reproducible carve shuffles.
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Seed the generator.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64_internal().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn labeled(label: &str, count: usize) -> Vec<Record> {
        (0..count)
            .map(|idx| Record::new(format!("{label}-{idx}"), label, 0.9, None))
            .collect()
    }

    #[test]
    fn carve_size_rounds_up_without_float_noise() {
        assert_eq!(carve_size(70, 0.1), 7);
        assert_eq!(carve_size(71, 0.1), 8);
        assert_eq!(carve_size(1845, 0.1111), 205);
        assert_eq!(carve_size(0, 0.1), 0);
        assert_eq!(carve_size(10, 0.0), 0);
    }

    #[test]
    fn largest_remainder_allocation_sums_to_target() {
        assert_eq!(allocate_proportional(&[50, 2000], 205), vec![5, 200]);
        assert_eq!(allocate_proportional(&[2, 2, 2], 1), vec![1, 0, 0]);
        assert_eq!(allocate_proportional(&[3, 7], 2), vec![1, 1]);
        let sizes = [13, 1, 29, 4, 8];
        let allocation = allocate_proportional(&sizes, 6);
        assert_eq!(allocation.iter().sum::<usize>(), 6);
        for (size, take) in sizes.iter().zip(&allocation) {
            assert!(take <= size);
        }
    }

    #[test]
    fn split_is_an_exact_partition() {
        let mut records = labeled("A", 50);
        records.extend(labeled("B", 2000));
        let split = stratified_split(&records, &CurationConfig::default());
        assert_eq!(split.len(), records.len());

        let all: HashSet<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let mut seen = HashSet::new();
        for label in [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test] {
            for record in split.get(label) {
                assert!(seen.insert(record.text.as_str()), "duplicate {}", record.text);
            }
        }
        assert_eq!(seen, all);

        let test = label_counts(&split.test);
        let validation = label_counts(&split.validation);
        let train = label_counts(&split.train);
        assert_eq!((test["A"], validation["A"], train["A"]), (5, 5, 40));
        assert_eq!((test["B"], validation["B"], train["B"]), (200, 200, 1600));
    }

    #[test]
    fn split_is_reproducible_for_a_seed() {
        let records = labeled("A", 40);
        let config = CurationConfig::default();
        let first = stratified_split(&records, &config);
        let second = stratified_split(&records, &config);
        assert_eq!(first.test, second.test);
        assert_eq!(first.validation, second.validation);

        let other = CurationConfig {
            random_seed: 7,
            ..CurationConfig::default()
        };
        let third = stratified_split(&records, &other);
        assert_eq!(third.test.len(), first.test.len());
    }

    #[test]
    fn two_record_labels_may_lose_their_training_share() {
        let records = labeled("P", 2);
        let config = CurationConfig {
            test_fraction: 0.5,
            validation_fraction: 0.5,
            ..CurationConfig::default()
        };
        let split = stratified_split(&records, &config);
        assert_eq!(split.len(), 2);
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.validation.len(), 1);
        assert_eq!(split.labels_without_train(), vec!["P".to_string()]);
    }

    #[test]
    fn artifact_names_follow_split_labels() {
        assert_eq!(SplitLabel::Validation.records_filename(), "val.csv");
        assert_eq!(SplitLabel::Test.metadata_filename(), "metadata_test.csv");
        assert_eq!(SplitLabel::Validation.to_string(), "validation");
    }
}
