use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::ingestion::{BATCH_EXTENSION, DEFAULT_BATCH_PREFIX};
use crate::errors::CurationError;

/// Filesystem transport that enumerates producer batch files under a root.
pub struct BatchLocator {
    root: PathBuf,
    prefix: String,
    follow_links: bool,
}

impl BatchLocator {
    /// Create a locator rooted at `root` using the default batch prefix.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: DEFAULT_BATCH_PREFIX.to_string(),
            follow_links: false,
        }
    }

    /// Override the batch file-name prefix (empty accepts every `.csv`).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// List batch files in deterministic order (see [`batch_order_key`]).
    pub fn discover(&self) -> Result<Vec<PathBuf>, CurationError> {
        if !self.root.is_dir() {
            return Err(CurationError::LocationUnavailable {
                path: self.root.clone(),
                reason: "not a directory".to_string(),
            });
        }
        let mut walker = WalkDir::new(&self.root);
        if self.follow_links {
            walker = walker.follow_links(true);
        }
        let mut candidates = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| CurationError::LocationUnavailable {
                path: err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone()),
                reason: err.to_string(),
            })?;
            if entry.file_type().is_file() && is_batch_file(entry.path(), &self.prefix) {
                candidates.push(entry.into_path());
            }
        }
        candidates.sort_by_cached_key(|path| batch_order_key(path));
        Ok(candidates)
    }
}

/// True if the file name starts with `prefix` and has a `.csv` extension (case-insensitive).
pub fn is_batch_file(path: &Path, prefix: &str) -> bool {
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(BATCH_EXTENSION))
        .unwrap_or(false);
    let has_prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(prefix))
        .unwrap_or(false);
    has_extension && has_prefix
}

/// Start index encoded in `labeled_batch_<start>_<end>.csv` style names.
pub fn batch_index(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let mut segments = stem.rsplit('_');
    segments.next()?;
    segments.next()?.parse().ok()
}

/// Ordering key: numbered batches first by start index, then by path.
pub fn batch_order_key(path: &Path) -> (bool, Option<u64>, PathBuf) {
    let index = batch_index(path);
    (index.is_none(), index, path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn batch_index_reads_start_segment() {
        assert_eq!(batch_index(Path::new("labeled_batch_200_300.csv")), Some(200));
        assert_eq!(batch_index(Path::new("labeled_batch_IAB1_Arts.csv")), None);
        assert_eq!(batch_index(Path::new("single.csv")), None);
    }

    #[test]
    fn discover_orders_numbered_batches_numerically() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        for name in [
            "labeled_batch_1000_1100.csv",
            "labeled_batch_200_300.csv",
            "labeled_batch_extra.csv",
            "labeled_batch_0_100.csv",
            "notes.txt",
            "other_0_100.csv",
        ] {
            fs::write(root.join(name), "text,label,confidence\n").unwrap();
        }
        fs::create_dir(root.join("nested")).unwrap();
        fs::write(
            root.join("nested").join("labeled_batch_100_200.CSV"),
            "text,label,confidence\n",
        )
        .unwrap();

        let found = BatchLocator::new(root).discover().unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "labeled_batch_0_100.csv",
                "labeled_batch_100_200.CSV",
                "labeled_batch_200_300.csv",
                "labeled_batch_1000_1100.csv",
                "labeled_batch_extra.csv",
            ]
        );
    }

    #[test]
    fn empty_prefix_accepts_every_csv() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("missing_A.csv"), "").unwrap();
        let found = BatchLocator::new(temp.path())
            .with_prefix("")
            .discover()
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("labeled_batch_0_1.csv"), "text,label,confidence\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Privileged users bypass directory permissions.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = BatchLocator::new(temp.path()).discover();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        match result {
            Err(CurationError::LocationUnavailable { path, .. }) => assert_eq!(path, locked),
            other => panic!("expected an unavailable location, got {other:?}"),
        }
    }

    #[test]
    fn missing_root_is_unavailable() {
        let temp = tempdir().unwrap();
        let err = BatchLocator::new(temp.path().join("absent"))
            .discover()
            .unwrap_err();
        assert!(matches!(err, CurationError::LocationUnavailable { .. }));
    }
}
