//! The disk page scanner / file reader external collaborator.
//!
//! The core only ever calls `scan` and `read`; it never interprets file contents.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AccrsError, Result};

/// Supplies raw bytes and a (filespec, size) inventory: a scan of a directory
/// plus a read of one file, nothing else.
pub trait PageSource: Send + Sync {
    /// Lists every page under `root`, returning its path and size in bytes.
    fn scan(&self, root: &Path) -> Result<Vec<(PathBuf, u64)>>;

    /// Reads one page's full contents.
    fn read(&self, filespec: &Path) -> Result<Vec<u8>>;
}

/// A `PageSource` backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPageSource;

impl PageSource for FsPageSource {
    fn scan(&self, root: &Path) -> Result<Vec<(PathBuf, u64)>> {
        let mut out = Vec::new();
        let entries = fs::read_dir(root)
            .map_err(|e| AccrsError::Generic(format!("scan {}: {e}", root.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| AccrsError::Generic(format!("scan entry: {e}")))?;
            let meta = entry
                .metadata()
                .map_err(|e| AccrsError::Generic(format!("stat entry: {e}")))?;
            if meta.is_file() {
                out.push((entry.path(), meta.len()));
            }
        }
        out.sort();
        Ok(out)
    }

    fn read(&self, filespec: &Path) -> Result<Vec<u8>> {
        fs::read(filespec)
            .map_err(|e| AccrsError::Generic(format!("read {}: {e}", filespec.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_and_reads_a_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.page"), b"hello").unwrap();
        std::fs::write(dir.path().join("b.page"), b"world!").unwrap();

        let src = FsPageSource;
        let listing = src.scan(dir.path()).unwrap();
        assert_eq!(listing.len(), 2);

        let (path, size) = &listing[0];
        assert_eq!(*size, 5);
        assert_eq!(src.read(path).unwrap(), b"hello");
    }
}
