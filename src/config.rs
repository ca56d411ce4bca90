use serde::Serialize;

use crate::constants::curation::{
    DEFAULT_BACKFILL_MULTIPLIER, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LOW_CONFIDENCE_WARNING,
    DEFAULT_MIN_CLASS_SIZE_FOR_SPLIT, DEFAULT_PER_CLASS_CAP, DEFAULT_RANDOM_SEED,
    DEFAULT_TEST_FRACTION, DEFAULT_VALIDATION_FRACTION,
};
use crate::errors::CurationError;

/// Policy knobs threaded through every curation stage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CurationConfig {
    /// Records with `confidence >= confidence_threshold` form the high tier.
    pub confidence_threshold: f64,
    /// Maximum records kept per label in the balanced set.
    pub per_class_cap: usize,
    /// Backfill quota is `deficit * backfill_multiplier`.
    pub backfill_multiplier: usize,
    /// Labels with fewer balanced records are dropped before splitting.
    pub min_class_size_for_split: usize,
    /// Fraction of each label carved into test.
    pub test_fraction: f64,
    /// Fraction of each label's post-test remainder carved into validation.
    pub validation_fraction: f64,
    /// Seed for the stratified carve shuffles.
    pub random_seed: u64,
    /// Balanced labels with a mean confidence below this are flagged.
    pub low_confidence_warning: f64,
    /// Also backfill labels that only occur in the low-confidence reserve.
    ///
    /// Off by default: only labels that reached the balanced set are
    /// considered under-represented.
    pub backfill_absent_labels: bool,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            per_class_cap: DEFAULT_PER_CLASS_CAP,
            backfill_multiplier: DEFAULT_BACKFILL_MULTIPLIER,
            min_class_size_for_split: DEFAULT_MIN_CLASS_SIZE_FOR_SPLIT,
            test_fraction: DEFAULT_TEST_FRACTION,
            validation_fraction: DEFAULT_VALIDATION_FRACTION,
            random_seed: DEFAULT_RANDOM_SEED,
            low_confidence_warning: DEFAULT_LOW_CONFIDENCE_WARNING,
            backfill_absent_labels: false,
        }
    }
}

impl CurationConfig {
    /// Validate ranges and return the config unchanged.
    pub fn validated(self) -> Result<Self, CurationError> {
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("low_confidence_warning", self.low_confidence_warning)?;
        check_fraction("test_fraction", self.test_fraction)?;
        check_fraction("validation_fraction", self.validation_fraction)?;
        if self.per_class_cap == 0 {
            return Err(CurationError::Configuration(
                "per_class_cap must be at least 1".to_string(),
            ));
        }
        if self.min_class_size_for_split == 0 {
            return Err(CurationError::Configuration(
                "min_class_size_for_split must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), CurationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CurationError::Configuration(format!(
            "{name} must be within [0, 1] (got {value})"
        )));
    }
    Ok(())
}

fn check_fraction(name: &str, value: f64) -> Result<(), CurationError> {
    if !(0.0..1.0).contains(&value) {
        return Err(CurationError::Configuration(format!(
            "{name} must be within [0, 1) (got {value})"
        )));
    }
    Ok(())
}
