//! Key to filename mapping

use sha2::{Digest, Sha256};
use std::path::Path;

/// Filesystem-safe filename for `key`, keeping the extension of `source`
pub fn cache_filename(key: &str, source: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hex::encode(hasher.finalize());

    match source.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", digest, ext),
        _ => digest,
    }
}
