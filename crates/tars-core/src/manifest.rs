//! Manifest of indexed files stored in <db_dir>/processed_files.json

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{layout, Result};

/// Map of filename -> fingerprint of the content last indexed.
///
/// A filename is only recorded once its chunks are persisted in the vector
/// store, so every entry has chunks behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexManifest {
    files: BTreeMap<String, String>,
}

impl IndexManifest {
    /// Load from disk; a missing manifest is an empty one.
    pub fn load(db_dir: &Path) -> Result<Self> {
        let path = layout::manifest_path(db_dir);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to disk, replacing the previous manifest atomically.
    pub fn save(&self, db_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        layout::write_atomic(&layout::manifest_path(db_dir), content.as_bytes())
    }

    /// True iff `filename` was last indexed with exactly `fingerprint`.
    pub fn is_unchanged(&self, filename: &str, fingerprint: &str) -> bool {
        self.files.get(filename).is_some_and(|f| f == fingerprint)
    }

    pub fn record(&mut self, filename: impl Into<String>, fingerprint: impl Into<String>) {
        self.files.insert(filename.into(), fingerprint.into());
    }

    /// Remove an entry, returning its fingerprint.
    pub fn forget(&mut self, filename: &str) -> Option<String> {
        self.files.remove(filename)
    }

    pub fn get(&self, filename: &str) -> Option<&str> {
        self.files.get(filename).map(String::as_str)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_missing_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = IndexManifest::load(temp.path()).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_is_unchanged() {
        let mut manifest = IndexManifest::default();
        assert!(!manifest.is_unchanged("a.txt", "abc"));

        manifest.record("a.txt", "abc");
        assert!(manifest.is_unchanged("a.txt", "abc"));
        assert!(!manifest.is_unchanged("a.txt", "def"));
        assert!(!manifest.is_unchanged("b.txt", "abc"));

        manifest.record("a.txt", "def");
        assert!(manifest.is_unchanged("a.txt", "def"));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_save_writes_flat_object() {
        let temp = tempfile::tempdir().unwrap();
        let mut manifest = IndexManifest::default();
        manifest.record("b.txt", "22");
        manifest.record("a.txt", "11");
        manifest.save(temp.path()).unwrap();

        let raw = std::fs::read_to_string(layout::manifest_path(temp.path())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({"a.txt": "11", "b.txt": "22"}));

        assert_eq!(IndexManifest::load(temp.path()).unwrap(), manifest);
    }

    #[test]
    fn test_forget() {
        let mut manifest = IndexManifest::default();
        manifest.record("a.txt", "11");

        assert_eq!(manifest.forget("a.txt").as_deref(), Some("11"));
        assert_eq!(manifest.forget("a.txt"), None);
        assert_eq!(manifest.filenames().count(), 0);
    }
}
