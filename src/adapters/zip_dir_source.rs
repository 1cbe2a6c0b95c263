//! Directory of zip archives as a record source.

use std::fs;
use std::path::PathBuf;

use crate::domain::error::FxsweepError;
use crate::domain::loader::ArchiveOrder;
use crate::ports::record_source::RecordSource;

/// Reads `<PREFIX>*.zip` files from one directory.
pub struct ZipDirSource {
    dir: PathBuf,
    order: ArchiveOrder,
}

impl ZipDirSource {
    pub fn new(dir: PathBuf, order: ArchiveOrder) -> Self {
        Self { dir, order }
    }
}

impl RecordSource for ZipDirSource {
    fn list_archives(&self, prefix: &str) -> Result<Vec<String>, FxsweepError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                continue;
            };
            if name.starts_with(prefix) && name.to_lowercase().ends_with(".zip") {
                names.push(name);
            }
        }
        if self.order == ArchiveOrder::Name {
            names.sort();
        }
        tracing::debug!(dir = %self.dir.display(), archives = names.len(), "listed archives");
        Ok(names)
    }

    fn read_archive(&self, name: &str) -> Result<Vec<u8>, FxsweepError> {
        let path = self.dir.join(name);
        fs::read(&path).map_err(|e| FxsweepError::Archive {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        fs::write(dir.path().join(name), b"zip").unwrap();
    }

    #[test]
    fn lists_matching_archives_by_name() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "USDJPY_202402.zip");
        touch(&dir, "USDJPY_202401.zip");
        touch(&dir, "EURUSD_202401.zip");
        touch(&dir, "USDJPY_notes.txt");
        fs::create_dir(dir.path().join("USDJPY_dir.zip")).unwrap();

        let source = ZipDirSource::new(dir.path().to_path_buf(), ArchiveOrder::Name);
        assert_eq!(
            source.list_archives("USDJPY").unwrap(),
            vec!["USDJPY_202401.zip", "USDJPY_202402.zip"]
        );
    }

    #[test]
    fn listing_order_returns_same_set() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "USDJPY_202402.zip");
        touch(&dir, "USDJPY_202401.zip");
        let source = ZipDirSource::new(dir.path().to_path_buf(), ArchiveOrder::Listing);
        let mut names = source.list_archives("USDJPY").unwrap();
        names.sort();
        assert_eq!(names, vec!["USDJPY_202401.zip", "USDJPY_202402.zip"]);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let source = ZipDirSource::new(PathBuf::from("/nonexistent/fxsweep"), ArchiveOrder::Name);
        assert!(matches!(
            source.list_archives("USDJPY"),
            Err(FxsweepError::Io(_))
        ));
    }

    #[test]
    fn read_archive_returns_bytes() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "USDJPY_202401.zip");
        let source = ZipDirSource::new(dir.path().to_path_buf(), ArchiveOrder::Name);
        assert_eq!(source.read_archive("USDJPY_202401.zip").unwrap(), b"zip");
        assert!(matches!(
            source.read_archive("USDJPY_209901.zip"),
            Err(FxsweepError::Archive { .. })
        ));
    }
}
