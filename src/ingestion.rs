//! Batch ingestion and dedup merge.
//!
//! Batches are enumerated in an explicit order (location id, then batch
//! index, then path, then row) so that "first occurrence wins" is
//! reproducible across filesystems.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, info};

use crate::constants::ingestion::{
    COLUMN_CONFIDENCE, COLUMN_LABEL, COLUMN_LABEL_LEGACY, COLUMN_SOURCE, COLUMN_TEXT,
    DEFAULT_BATCH_PREFIX,
};
use crate::data::{Batch, Corpus, Record, SourceTag};
use crate::errors::CurationError;
use crate::transport::fs::BatchLocator;
use crate::types::LocationId;

/// One provenance location: a directory of batches from a producer family.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvenanceLocation {
    /// Stable identifier; also the primary ordering key.
    pub id: LocationId,
    /// Directory scanned for batch files.
    pub root: PathBuf,
    /// Explicit source tag for every record under this location.
    pub source: Option<SourceTag>,
}

/// Caller-supplied mapping of provenance locations to source tags.
#[derive(Clone, Debug)]
pub struct ProvenanceManifest {
    locations: Vec<ProvenanceLocation>,
    infer_unmapped: bool,
    batch_prefix: String,
    follow_links: bool,
}

impl Default for ProvenanceManifest {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            infer_unmapped: false,
            batch_prefix: DEFAULT_BATCH_PREFIX.to_string(),
            follow_links: false,
        }
    }
}

impl ProvenanceManifest {
    /// Empty manifest with the default batch prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a location whose records all carry `source`.
    pub fn with_location(
        mut self,
        id: impl Into<LocationId>,
        root: impl Into<PathBuf>,
        source: SourceTag,
    ) -> Self {
        self.locations.push(ProvenanceLocation {
            id: id.into(),
            root: root.into(),
            source: Some(source),
        });
        self
    }

    /// Register a location without an explicit tag.
    ///
    /// Records keep their own `source` cell when present; otherwise the tag
    /// is inferred from the id (if enabled) or left unset.
    pub fn with_unmapped_location(
        mut self,
        id: impl Into<LocationId>,
        root: impl Into<PathBuf>,
    ) -> Self {
        self.locations.push(ProvenanceLocation {
            id: id.into(),
            root: root.into(),
            source: None,
        });
        self
    }

    /// Enable `*synthetic*` / `*natural*` / `*manual*` name inference for unmapped locations.
    pub fn with_name_inference(mut self, enabled: bool) -> Self {
        self.infer_unmapped = enabled;
        self
    }

    /// Override the batch file-name prefix.
    pub fn with_batch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.batch_prefix = prefix.into();
        self
    }

    /// Configure symlink traversal during discovery.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Locations in registration order.
    pub fn locations(&self) -> &[ProvenanceLocation] {
        &self.locations
    }

    /// Locations sorted by id, then root.
    pub fn ordered_locations(&self) -> Vec<&ProvenanceLocation> {
        let mut ordered: Vec<&ProvenanceLocation> = self.locations.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.root.cmp(&b.root)));
        ordered
    }

    /// Tag applied to rows of `location` that lack a `source` cell.
    pub fn fallback_tag(&self, location: &ProvenanceLocation) -> Option<SourceTag> {
        location.source.or_else(|| {
            self.infer_unmapped
                .then(|| SourceTag::infer_from_name(&location.id))
        })
    }
}

/// Result of the ingestion stage.
#[derive(Clone, Debug)]
pub struct IngestionOutcome {
    /// Deduplicated corpus.
    pub corpus: Corpus,
    /// Number of batch files read.
    pub batches: usize,
    /// Rows read before dedup.
    pub rows_read: usize,
    /// Rows dropped as duplicate text.
    pub duplicates_removed: usize,
}

/// Read every batch under the manifest and merge them into one corpus.
pub fn ingest(manifest: &ProvenanceManifest) -> Result<IngestionOutcome, CurationError> {
    let batches = load_batches(manifest)?;
    if batches.is_empty() {
        return Err(CurationError::NoInputBatches {
            locations: manifest.locations.len(),
        });
    }
    let rows_read: usize = batches.iter().map(|batch| batch.records.len()).sum();
    let corpus = Corpus::from_batches(&batches);
    let duplicates_removed = rows_read - corpus.len();
    info!(
        "[curate] merged {} batch file(s): {} rows, {} unique, {} duplicate(s) removed",
        batches.len(),
        rows_read,
        corpus.len(),
        duplicates_removed
    );
    Ok(IngestionOutcome {
        corpus,
        batches: batches.len(),
        rows_read,
        duplicates_removed,
    })
}

/// Discover and parse batches in deterministic order.
pub fn load_batches(manifest: &ProvenanceManifest) -> Result<Vec<Batch>, CurationError> {
    let mut batches = Vec::new();
    for location in manifest.ordered_locations() {
        let paths = BatchLocator::new(&location.root)
            .with_prefix(manifest.batch_prefix.clone())
            .with_follow_symlinks(manifest.follow_links)
            .discover()?;
        let fallback = manifest.fallback_tag(location);
        debug!(
            "[curate] location '{}' ({}) has {} batch file(s), source={}",
            location.id,
            location.root.display(),
            paths.len(),
            fallback.map(SourceTag::as_str).unwrap_or("<from rows>")
        );
        for path in paths {
            let explicit = location.source;
            let records = read_batch_records(&path, explicit, fallback)?;
            batches.push(Batch {
                location: location.id.clone(),
                path,
                source: fallback.unwrap_or(SourceTag::Unknown),
                records,
            });
        }
    }
    Ok(batches)
}

/// Column positions resolved from a batch header.
#[derive(Clone, Copy, Debug)]
struct BatchColumns {
    text: usize,
    label: usize,
    confidence: usize,
    source: Option<usize>,
}

impl BatchColumns {
    fn resolve(path: &Path, headers: &StringRecord) -> Result<Self, CurationError> {
        let position = |name: &str| headers.iter().position(|header| header.trim() == name);
        let text = position(COLUMN_TEXT);
        let label = position(COLUMN_LABEL).or_else(|| position(COLUMN_LABEL_LEGACY));
        let confidence = position(COLUMN_CONFIDENCE);
        match (text, label, confidence) {
            (Some(text), Some(label), Some(confidence)) => Ok(Self {
                text,
                label,
                confidence,
                source: position(COLUMN_SOURCE),
            }),
            _ => {
                let missing = [
                    (text.is_none(), COLUMN_TEXT),
                    (label.is_none(), COLUMN_LABEL),
                    (confidence.is_none(), COLUMN_CONFIDENCE),
                ]
                .into_iter()
                .filter_map(|(absent, name)| absent.then(|| name.to_string()))
                .collect();
                Err(CurationError::MissingColumns {
                    path: path.to_path_buf(),
                    missing,
                })
            }
        }
    }
}

/// Parse one batch file.
///
/// `explicit` overrides any per-row `source` cell; `fallback` applies to rows
/// without one.
pub fn read_batch_records(
    path: &Path,
    explicit: Option<SourceTag>,
    fallback: Option<SourceTag>,
) -> Result<Vec<Record>, CurationError> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let columns = BatchColumns::resolve(path, reader.headers()?)?;
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|pos| pos.line()).unwrap_or(0);
        let cell = |idx: usize| row.get(idx).unwrap_or("");
        let confidence = parse_confidence(cell(columns.confidence)).map_err(|reason| {
            CurationError::InvalidRow {
                path: path.to_path_buf(),
                row: line,
                reason,
            }
        })?;
        let row_source = columns
            .source
            .map(cell)
            .filter(|value| !value.trim().is_empty())
            .map(SourceTag::parse);
        records.push(Record::new(
            cell(columns.text),
            cell(columns.label),
            confidence,
            explicit.or(row_source).or(fallback),
        ));
    }
    Ok(records)
}

fn parse_confidence(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("confidence '{raw}' is not a number"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("confidence {value} is outside [0, 1]"));
    }
    Ok(value)
}
