//! Export of every stored pair as a `key,value` text dump

use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{IndexError, IndexResult};
use crate::file_manager::IndexFile;
use crate::storage::block::Backend;

impl<F: Backend> IndexFile<F> {
    /// Write one `key,value` line per pair in ascending key order.
    ///
    /// Returns the number of lines written. Stops at the first node that
    /// cannot be read.
    pub fn export_to<W: Write>(&mut self, out: &mut W) -> IndexResult<u64> {
        let mut written = 0u64;
        for pair in self.traverse()? {
            let (key, value) = pair?;
            writeln!(out, "{},{}", key, value)?;
            written += 1;
        }
        out.flush()?;
        Ok(written)
    }

    /// Export to a file; an existing file is replaced only when
    /// `overwrite` is set.
    ///
    /// The dump is written to a temporary file next to `path` and renamed
    /// over it once complete, so a failed export leaves `path` untouched.
    pub fn export_file(&mut self, path: &Path, overwrite: bool) -> IndexResult<u64> {
        self.ensure_usable()?;
        if path.exists() && !overwrite {
            return Err(IndexError::AlreadyExists(path.to_path_buf()));
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)?;
        let mut out = BufWriter::new(staged.as_file_mut());
        let written = self.export_to(&mut out)?;
        drop(out);
        staged.as_file().sync_all()?;

        if overwrite {
            staged.persist(path).map_err(io::Error::from)?;
        } else {
            staged.persist_noclobber(path).map_err(|e| {
                if e.error.kind() == io::ErrorKind::AlreadyExists {
                    IndexError::AlreadyExists(path.to_path_buf())
                } else {
                    IndexError::Io(e.error)
                }
            })?;
        }

        info!("Extracted {} pairs to {}", written, path.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::IndexOptions;
    use crate::operations::import::ImportFormat;
    use crate::operations::tests_support::memory_index;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_export_empty() {
        let mut index = memory_index();
        let mut out = Vec::new();
        assert_eq!(index.export_to(&mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_export_sorted_lines() {
        let mut index = memory_index();
        for (k, v) in [(9, 90), (2, 20), (5, 50)] {
            index.insert(k, v).unwrap();
        }
        let mut out = Vec::new();
        assert_eq!(index.export_to(&mut out).unwrap(), 3);
        assert_eq!(String::from_utf8(out).unwrap(), "2,20\n5,50\n9,90\n");
    }

    #[test]
    fn test_export_then_load_reproduces_pairs() {
        let mut source = memory_index();
        for k in 0..300u64 {
            source.insert(k * 3, k).unwrap();
        }
        let mut dump = Vec::new();
        source.export_to(&mut dump).unwrap();

        let mut copy = memory_index();
        let report = copy
            .import_from(&mut dump.as_slice(), ImportFormat::Auto)
            .unwrap();
        assert_eq!(report.inserted, 300);
        assert_eq!(copy.entries().unwrap(), source.entries().unwrap());
    }

    #[test]
    fn test_export_file_respects_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.txt");
        std::fs::write(&path, "old").unwrap();

        let mut index = memory_index();
        index.insert(1, 2).unwrap();

        assert!(matches!(
            index.export_file(&path, false),
            Err(IndexError::AlreadyExists(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");

        assert_eq!(index.export_file(&path, true).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1,2\n");
    }

    #[test]
    fn test_failed_export_keeps_previous_file() {
        let mut bytes = Vec::new();
        {
            let mut index =
                IndexFile::format(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
            for k in 1..=20u64 {
                index.insert(k, k).unwrap();
            }
        }
        // Leaf 3 holds 12..=20; 1..=11 are exported before it is reached
        bytes[3 * 512 + 16] = 0xEE;

        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.txt");
        std::fs::write(&path, "previous\n").unwrap();

        let mut index = IndexFile::load(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
        assert!(matches!(
            index.export_file(&path, true),
            Err(IndexError::CorruptNode { block: 3, .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous\n");
        // No staging file is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_export_fails_on_corrupt_node() {
        let mut bytes = Vec::new();
        {
            let mut index =
                IndexFile::format(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
            for k in 1..=20u64 {
                index.insert(k, k).unwrap();
            }
        }
        bytes[3 * 512 + 16] = 0xEE;

        let mut index = IndexFile::load(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            index.export_to(&mut out),
            Err(IndexError::CorruptNode { block: 3, .. })
        ));
    }
}
