//! Content fingerprints for change detection

use std::path::Path;

use crate::Result;

/// Blake3 digest of `bytes` as 64 lowercase hex characters.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Fingerprint the full contents of the file at `path`.
pub fn fingerprint(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    Ok(fingerprint_bytes(&content))
}
