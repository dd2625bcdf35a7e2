//! One-file-per-packet source.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{FetchError, PacketSource};
use crate::packet::Packet;

/// Serves the raw bytes of a fixed, sorted list of files.
///
/// The file list is captured once at construction, which keeps
/// `packet_count()` stable even if the directory changes afterwards.
#[derive(Debug, Clone)]
pub struct FileListSource {
    paths: Vec<PathBuf>,
}

impl FileListSource {
    /// Serve exactly these files, in this order.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Every regular file matching a glob pattern, sorted by path.
    pub fn from_pattern(pattern: &str) -> Result<Self, glob::PatternError> {
        let mut paths: Vec<PathBuf> = glob::glob(pattern)?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        debug!(pattern, files = paths.len(), "Collected packet files");
        Ok(Self { paths })
    }

    /// Every regular file directly inside `dir`, sorted by path.
    pub fn from_dir(dir: &Path) -> Result<Self, glob::PatternError> {
        let escaped = glob::Pattern::escape(&dir.to_string_lossy());
        Self::from_pattern(&format!("{}/*", escaped))
    }

    /// The files backing this source.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl PacketSource for FileListSource {
    fn packet_count(&self) -> usize {
        self.paths.len()
    }

    fn fetch_packet(&self, index: usize) -> Result<Packet, FetchError> {
        let path = self.paths.get(index).ok_or(FetchError::OutOfRange {
            index,
            count: self.paths.len(),
        })?;
        fs::read(path).map(Packet::new).map_err(|e| FetchError::Io {
            index,
            path: path.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        fs::write(dir.join("000002.bin"), [2u8, 2]).unwrap();
        fs::write(dir.join("000000.bin"), [0u8]).unwrap();
        fs::write(dir.join("000001.bin"), [1u8, 1, 1]).unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
    }

    #[test]
    fn test_from_dir_sorts_and_skips_directories() {
        let temp = TempDir::new().unwrap();
        populate(temp.path());

        let source = FileListSource::from_dir(temp.path()).unwrap();
        assert_eq!(source.packet_count(), 3);
        assert_eq!(source.fetch_packet(0).unwrap().data().as_ref(), &[0]);
        assert_eq!(source.fetch_packet(1).unwrap().byte_len(), 3);
        assert_eq!(source.fetch_packet(2).unwrap().data().as_ref(), &[2, 2]);
    }

    #[test]
    fn test_from_pattern_filters() {
        let temp = TempDir::new().unwrap();
        populate(temp.path());
        fs::write(temp.path().join("notes.txt"), b"skip").unwrap();

        let pattern = format!("{}/*.bin", temp.path().display());
        let source = FileListSource::from_pattern(&pattern).unwrap();
        assert_eq!(source.packet_count(), 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let source = FileListSource::new(vec![temp.path().join("gone.bin")]);

        let err = source.fetch_packet(0).unwrap_err();
        assert!(matches!(err, FetchError::Io { index: 0, .. }));
    }

    #[test]
    fn test_out_of_range() {
        let source = FileListSource::new(Vec::new());
        assert!(matches!(
            source.fetch_packet(0),
            Err(FetchError::OutOfRange { index: 0, count: 0 })
        ));
    }
}
