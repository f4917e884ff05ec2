//! Source documents: discovery in a flat directory and decoding

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::fingerprint::fingerprint_bytes;
use crate::{Result, TarsError};

/// A candidate file found in the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name without directory components (the manifest key)
    pub filename: String,
    /// Full path on disk
    pub path: PathBuf,
}

/// A document read from disk.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    /// Blake3 hex digest of the raw bytes
    pub fingerprint: String,
    pub text: String,
}

impl Document {
    /// Build a document from raw bytes, which must be UTF-8.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let filename = filename.into();
        let fingerprint = fingerprint_bytes(&bytes);
        let text = String::from_utf8(bytes)
            .map_err(|e| TarsError::Index(format!("{filename} is not valid UTF-8: {e}")))?;

        Ok(Self {
            filename,
            fingerprint,
            text,
        })
    }
}

/// Check whether `path` carries the supported extension (case-insensitive).
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

/// List files with `extension` directly inside `dir`, sorted by name.
///
/// Subdirectories are not scanned.
pub fn list_sources(dir: &Path, extension: &str) -> Result<Vec<SourceFile>> {
    if !dir.is_dir() {
        return Err(TarsError::Index(format!(
            "source directory not found: {}",
            dir.display()
        )));
    }

    let walker = WalkBuilder::new(dir)
        .max_depth(Some(1))
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let path = entry.path();
        if entry.depth() == 0 || !path.is_file() || !has_extension(path, extension) {
            continue;
        }

        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };

        files.push(SourceFile {
            filename,
            path: path.to_path_buf(),
        });
    }

    Ok(files)
}
