//! Artifact layout and atomic CSV writers.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::balance::BackfillSelection;
use crate::constants::artifacts::{
    CLASS_DIR, CLASS_PREFIX, COMBINED_FILENAME, METADATA_BALANCED_FILENAME, MISSING_DIR,
    MISSING_PREFIX, PARTIAL_SUFFIX, REPORT_FILENAME,
};
use crate::constants::ingestion::{COLUMN_CONFIDENCE, COLUMN_LABEL, COLUMN_SOURCE, COLUMN_TEXT};
use crate::data::{Record, label_buckets, sort_by_confidence_desc};
use crate::errors::CurationError;
use crate::splits::SplitLabel;
use crate::types::{ArtifactId, Label};
use crate::utils::sanitize_label;

/// Output directory layout for one curation run.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Lay artifacts out under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the deduplicated corpus.
    pub fn combined(&self) -> PathBuf {
        self.root.join(COMBINED_FILENAME)
    }

    /// Path of a split's record file (`train.csv`, `val.csv`, `test.csv`).
    pub fn split_records(&self, split: SplitLabel) -> PathBuf {
        self.root.join(split.records_filename())
    }

    /// Path of a split's metadata file.
    pub fn split_metadata(&self, split: SplitLabel) -> PathBuf {
        self.root.join(split.metadata_filename())
    }

    /// Path of the balanced-set metadata.
    pub fn balanced_metadata(&self) -> PathBuf {
        self.root.join(METADATA_BALANCED_FILENAME)
    }

    /// Path of the JSON run report.
    pub fn report(&self) -> PathBuf {
        self.root.join(REPORT_FILENAME)
    }

    /// Directory of per-label balanced artifacts.
    pub fn class_dir(&self) -> PathBuf {
        self.root.join(CLASS_DIR)
    }

    /// Directory of per-label backfill candidate artifacts.
    pub fn missing_dir(&self) -> PathBuf {
        self.root.join(MISSING_DIR)
    }

    /// `classes/class_<artifact>.csv`.
    pub fn class_file(&self, artifact: &str) -> PathBuf {
        self.class_dir()
            .join(format!("{CLASS_PREFIX}{artifact}.csv"))
    }

    /// `missing_classes/missing_<artifact>.csv`.
    pub fn missing_file(&self, artifact: &str) -> PathBuf {
        self.missing_dir()
            .join(format!("{MISSING_PREFIX}{artifact}.csv"))
    }
}

/// Label → artifact id mapping that is collision-free for one run.
#[derive(Clone, Debug, Default)]
pub struct ArtifactNamer {
    ids: IndexMap<Label, ArtifactId>,
}

impl ArtifactNamer {
    /// Sanitize every label, failing if two distinct labels share an id.
    pub fn for_labels<'a, I>(labels: I) -> Result<Self, CurationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ids: IndexMap<Label, ArtifactId> = IndexMap::new();
        let mut owners: BTreeMap<ArtifactId, Vec<Label>> = BTreeMap::new();
        for label in labels {
            if ids.contains_key(label) {
                continue;
            }
            let artifact = sanitize_label(label);
            owners
                .entry(artifact.clone())
                .or_default()
                .push(label.to_string());
            ids.insert(label.to_string(), artifact);
        }
        if let Some((artifact, mut labels)) = owners.into_iter().find(|(_, owners)| owners.len() > 1)
        {
            labels.sort();
            return Err(CurationError::ArtifactCollision { artifact, labels });
        }
        Ok(Self { ids })
    }

    /// Artifact id registered for `label`.
    pub fn artifact_for(&self, label: &str) -> Option<&str> {
        self.ids.get(label).map(String::as_str)
    }

    /// Number of registered labels.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no label is registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Write `path` through a sibling partial file renamed into place on success.
///
/// A failed write leaves no artifact at `path`.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), CurationError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), CurationError>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = File::create(&partial)
        .map_err(CurationError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&partial, path).map_err(CurationError::from));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// Serialize records as CSV; the `source` column is written when `with_source` is set.
///
/// Records without a tag get an empty `source` cell.
pub fn write_records<W: io::Write>(
    records: &[Record],
    with_source: bool,
    writer: W,
) -> Result<(), CurationError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if with_source {
        csv_writer.write_record([COLUMN_TEXT, COLUMN_LABEL, COLUMN_CONFIDENCE, COLUMN_SOURCE])?;
    } else {
        csv_writer.write_record([COLUMN_TEXT, COLUMN_LABEL, COLUMN_CONFIDENCE])?;
    }
    for record in records {
        let confidence = record.confidence.to_string();
        if with_source {
            let source = record.source.map(|tag| tag.as_str()).unwrap_or("");
            csv_writer.write_record([
                record.text.as_str(),
                record.label.as_str(),
                confidence.as_str(),
                source,
            ])?;
        } else {
            csv_writer.write_record([
                record.text.as_str(),
                record.label.as_str(),
                confidence.as_str(),
            ])?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

/// Atomically write `records` to `path` as CSV.
pub fn write_records_file(
    path: &Path,
    records: &[Record],
    with_source: bool,
) -> Result<(), CurationError> {
    write_atomic(path, |writer| write_records(records, with_source, writer))
}

/// Counts of per-label artifacts written by [`export_class_artifacts`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassExport {
    /// Balanced per-label files written.
    pub class_files: usize,
    /// Backfill candidate files written.
    pub missing_files: usize,
}

/// Write one balanced artifact per label and one candidate artifact per backfilled label.
///
/// Stale per-label artifacts from earlier runs are removed first.
pub fn export_class_artifacts(
    layout: &OutputLayout,
    namer: &ArtifactNamer,
    balanced: &[Record],
    backfill: &[BackfillSelection],
    with_source: bool,
) -> Result<ClassExport, CurationError> {
    for dir in [layout.class_dir(), layout.missing_dir()] {
        if dir.is_dir() {
            debug!("[curate] clearing stale artifacts in {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
    }

    let mut export = ClassExport::default();
    for (label, mut bucket) in label_buckets(balanced) {
        sort_by_confidence_desc(&mut bucket);
        let path = layout.class_file(artifact_id(namer, &label)?);
        write_records_file(&path, &bucket, with_source)?;
        debug!("[curate] saved {} ({} rows)", path.display(), bucket.len());
        export.class_files += 1;
    }
    for selection in backfill {
        let path = layout.missing_file(artifact_id(namer, &selection.label)?);
        write_records_file(&path, &selection.candidates, with_source)?;
        debug!(
            "[curate] saved {} ({} candidate rows)",
            path.display(),
            selection.candidates.len()
        );
        export.missing_files += 1;
    }
    info!(
        "[curate] exported {} class artifact(s) and {} backfill candidate artifact(s)",
        export.class_files, export.missing_files
    );
    Ok(export)
}

fn artifact_id<'a>(namer: &'a ArtifactNamer, label: &str) -> Result<&'a str, CurationError> {
    namer.artifact_for(label).ok_or_else(|| {
        CurationError::Configuration(format!("label '{label}' has no registered artifact id"))
    })
}
