use crate::splits::SplitLabel;

/// Default curation policy values.
pub mod curation {
    /// Records at or above this confidence enter the high-confidence tier.
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.45;
    /// Maximum records retained per label in the balanced set.
    pub const DEFAULT_PER_CLASS_CAP: usize = 2000;
    /// Backfill quota multiplier applied to a label's deficit.
    pub const DEFAULT_BACKFILL_MULTIPLIER: usize = 2;
    /// Labels with fewer balanced records are dropped before splitting.
    pub const DEFAULT_MIN_CLASS_SIZE_FOR_SPLIT: usize = 2;
    /// Fraction of each label carved into the test split.
    pub const DEFAULT_TEST_FRACTION: f64 = 0.1;
    /// Fraction of each label's remainder carved into the validation split.
    ///
    /// Compounded with the test carve this lands close to 80/10/10.
    pub const DEFAULT_VALIDATION_FRACTION: f64 = 0.1111;
    /// Seed for the stratified carve shuffles.
    pub const DEFAULT_RANDOM_SEED: u64 = 42;
    /// Balanced labels whose mean confidence falls below this are flagged.
    pub const DEFAULT_LOW_CONFIDENCE_WARNING: f64 = 0.75;
    /// Offset mixed into the seed for the validation carve so both stages
    /// do not replay the same shuffle stream.
    pub const VALIDATION_SEED_OFFSET: u64 = 0x5EED_0FF5;
    /// Decimal places kept for metadata ratios.
    pub const METADATA_DECIMALS: i32 = 3;
}

/// Constants used by batch discovery and tabular input.
pub mod ingestion {
    /// File-name prefix of producer batch files.
    pub const DEFAULT_BATCH_PREFIX: &str = "labeled_batch_";
    /// Extension of producer batch files.
    pub const BATCH_EXTENSION: &str = "csv";
    /// Required text column.
    pub const COLUMN_TEXT: &str = "text";
    /// Required label column.
    pub const COLUMN_LABEL: &str = "label";
    /// Legacy label column accepted in place of `label`.
    pub const COLUMN_LABEL_LEGACY: &str = "iab_label";
    /// Required confidence column.
    pub const COLUMN_CONFIDENCE: &str = "confidence";
    /// Optional source column.
    pub const COLUMN_SOURCE: &str = "source";
}

/// Constants used for output artifact layout.
pub mod artifacts {
    use super::SplitLabel;

    /// Deduplicated corpus file.
    pub const COMBINED_FILENAME: &str = "combined.csv";
    /// Machine-readable run report.
    pub const REPORT_FILENAME: &str = "report.json";
    /// Directory holding per-label balanced artifacts.
    pub const CLASS_DIR: &str = "classes";
    /// Directory holding per-label backfill candidate artifacts.
    pub const MISSING_DIR: &str = "missing_classes";
    /// File-name prefix of per-label balanced artifacts.
    pub const CLASS_PREFIX: &str = "class_";
    /// File-name prefix of per-label backfill candidate artifacts.
    pub const MISSING_PREFIX: &str = "missing_";
    /// Metadata file for the balanced set.
    pub const METADATA_BALANCED_FILENAME: &str = "metadata_balanced.csv";
    /// Suffix used for in-progress writes before the atomic rename.
    pub const PARTIAL_SUFFIX: &str = ".partial";
    /// Metadata header shared by every schema.
    pub const METADATA_BASE_HEADER: [&str; 3] = ["label", "num_samples", "avg_confidence"];
    /// Extra metadata columns emitted when source is known.
    pub const METADATA_SOURCE_HEADER: [&str; 3] = ["pct_synthetic", "pct_natural", "pct_manual"];
    /// Canonical split iteration order used for writing.
    pub const ALL_SPLITS: [SplitLabel; 3] =
        [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];
}

/// Label sanitization rules for artifact identifiers.
pub mod sanitize {
    /// Replacements applied in order. An empty replacement removes the pattern.
    pub const LABEL_REPLACEMENTS: [(char, &str); 9] = [
        (' ', "_"),
        ('\u{2019}', ""),
        ('\u{2018}', ""),
        ('\u{201C}', ""),
        ('\u{201D}', ""),
        (',', ""),
        ('\u{2013}', "-"),
        ('/', "-"),
        ('\\', "-"),
    ];
}
