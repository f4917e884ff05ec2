//! Layout of the db directory and atomic file replacement

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{CONFIG_FILE, MANIFEST_FILE, Result, STORE_FILE};

/// Get the manifest path.
pub fn manifest_path(db_dir: &Path) -> PathBuf {
    db_dir.join(MANIFEST_FILE)
}

/// Get the vector store path.
pub fn store_path(db_dir: &Path) -> PathBuf {
    db_dir.join(STORE_FILE)
}

/// Get the config file path.
pub fn config_path(db_dir: &Path) -> PathBuf {
    db_dir.join(CONFIG_FILE)
}

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a partial write.
///
/// The temp file lives in the destination directory so the final rename
/// stays on one filesystem.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_paths() {
        let db = Path::new("db");
        assert_eq!(manifest_path(db), db.join("processed_files.json"));
        assert_eq!(store_path(db), db.join("store.json"));
        assert_eq!(config_path(db), db.join("config.json"));
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("file.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        // Only the destination is left behind
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
