//! Size-based LRU eviction

use std::fs;
use std::io::ErrorKind;

use tracing::{debug, info, warn};

use crate::index::MetadataIndex;
use crate::types::CacheEntry;

/// Fill level eviction stops at, as a fraction of the size limit
pub const EVICTION_TARGET_RATIO: f64 = 0.9;

pub fn eviction_target(max_size_bytes: u64) -> u64 {
    (max_size_bytes as f64 * EVICTION_TARGET_RATIO).floor() as u64
}

/// On-disk size of the entry's file, or its recorded size if the file is gone
fn occupied_by(entry: &CacheEntry) -> u64 {
    fs::metadata(&entry.file_path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .unwrap_or(entry.size_bytes)
}

/// Total bytes occupied by the indexed entries
pub fn occupied_size(index: &MetadataIndex) -> u64 {
    index.iter().map(|(_, entry)| occupied_by(entry)).sum()
}

/// Evict least recently used entries once the index exceeds `max_size_bytes`
///
/// `keep` is never evicted, so an entry that was just inserted survives its
/// own insert. Returns the evicted keys, oldest first.
pub fn evict_if_needed(
    index: &mut MetadataIndex,
    max_size_bytes: u64,
    keep: Option<&str>,
) -> Vec<String> {
    let mut candidates: Vec<(String, f64, u64)> = index
        .iter()
        .map(|(key, entry)| (key.clone(), entry.last_accessed, occupied_by(entry)))
        .collect();

    let mut current: u64 = candidates.iter().map(|(_, _, size)| size).sum();
    if current <= max_size_bytes {
        return Vec::new();
    }

    let target = eviction_target(max_size_bytes);
    info!(
        current,
        max_size_bytes, target, "Cache size exceeds limit, evicting"
    );

    // Stable sort keeps key order for equal timestamps
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut evicted = Vec::new();
    for (key, _, size) in candidates {
        if current <= target {
            break;
        }
        if keep == Some(key.as_str()) {
            continue;
        }

        if let Some(entry) = index.remove(&key) {
            match fs::remove_file(&entry.file_path) {
                Ok(()) => debug!(
                    key = %key,
                    size,
                    last_accessed = ?entry.last_accessed_at(),
                    "Evicted cache entry"
                ),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(key = %key, "Evicted entry whose file was already gone")
                }
                Err(e) => warn!(key = %key, error = %e, "Failed to delete cache file"),
            }
        }
        current = current.saturating_sub(size);
        evicted.push(key);
    }

    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::METADATA_FILE;
    use std::path::Path;
    use tempfile::tempdir;

    fn add_file(index: &mut MetadataIndex, dir: &Path, key: &str, size: usize, at: f64) {
        let path = dir.join(format!("{}.bin", key));
        fs::write(&path, vec![0u8; size]).unwrap();
        index.insert(
            key.to_string(),
            CacheEntry {
                file_path: path,
                size_bytes: size as u64,
                access_count: 1,
                last_accessed: at,
            },
        );
    }

    #[test]
    fn test_eviction_target() {
        assert_eq!(eviction_target(1_048_576), 943_718);
        assert_eq!(eviction_target(100), 90);
    }

    #[test]
    fn test_under_limit_is_noop() {
        let dir = tempdir().unwrap();
        let mut index = MetadataIndex::load(dir.path().join(METADATA_FILE));
        add_file(&mut index, dir.path(), "a", 50, 1.0);
        add_file(&mut index, dir.path(), "b", 50, 2.0);

        assert!(evict_if_needed(&mut index, 100, None).is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_evicts_least_recently_used_first() {
        let dir = tempdir().unwrap();
        let mut index = MetadataIndex::load(dir.path().join(METADATA_FILE));
        // Inserted out of key order to show ordering is by access time
        add_file(&mut index, dir.path(), "c", 100, 3.0);
        add_file(&mut index, dir.path(), "a", 100, 1.0);
        add_file(&mut index, dir.path(), "b", 100, 2.0);
        let a_path = index.get("a").unwrap().file_path.clone();

        // 300 > 290, target 261: one eviction is enough
        let evicted = evict_if_needed(&mut index, 290, None);

        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(index.get("a").is_none());
        assert!(!a_path.exists());
        assert!(index.get("b").is_some());
        assert!(index.get("c").is_some());
        assert_eq!(occupied_size(&index), 200);
    }

    #[test]
    fn test_evicts_down_to_target() {
        let dir = tempdir().unwrap();
        let mut index = MetadataIndex::load(dir.path().join(METADATA_FILE));
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            add_file(&mut index, dir.path(), key, 30, i as f64);
        }

        // 120 > 100, target 90: evicting "a" lands exactly on 90
        let evicted = evict_if_needed(&mut index, 100, None);
        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(occupied_size(&index) <= eviction_target(100));
    }

    #[test]
    fn test_missing_file_counts_recorded_size_and_is_removed() {
        let dir = tempdir().unwrap();
        let mut index = MetadataIndex::load(dir.path().join(METADATA_FILE));
        add_file(&mut index, dir.path(), "old", 60, 1.0);
        add_file(&mut index, dir.path(), "new", 60, 2.0);
        fs::remove_file(&index.get("old").unwrap().file_path).unwrap();

        assert_eq!(occupied_size(&index), 120);

        let evicted = evict_if_needed(&mut index, 100, None);
        assert_eq!(evicted, vec!["old".to_string()]);
        assert!(index.get("old").is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_key() {
        let dir = tempdir().unwrap();
        let mut index = MetadataIndex::load(dir.path().join(METADATA_FILE));
        add_file(&mut index, dir.path(), "y", 60, 1.0);
        add_file(&mut index, dir.path(), "x", 60, 1.0);

        let evicted = evict_if_needed(&mut index, 100, None);
        assert_eq!(evicted, vec!["x".to_string()]);
    }

    #[test]
    fn test_kept_key_survives_even_when_oldest() {
        let dir = tempdir().unwrap();
        let mut index = MetadataIndex::load(dir.path().join(METADATA_FILE));
        add_file(&mut index, dir.path(), "fresh", 60, 1.0);
        add_file(&mut index, dir.path(), "other", 60, 2.0);

        let evicted = evict_if_needed(&mut index, 100, Some("fresh"));
        assert_eq!(evicted, vec!["other".to_string()]);
        assert!(index.get("fresh").is_some());
    }

    #[test]
    fn test_kept_key_alone_above_target_stays() {
        let dir = tempdir().unwrap();
        let mut index = MetadataIndex::load(dir.path().join(METADATA_FILE));
        add_file(&mut index, dir.path(), "old", 20, 1.0);
        add_file(&mut index, dir.path(), "big", 95, 2.0);

        // 115 > 100; evicting "old" leaves 95, above the target of 90
        let evicted = evict_if_needed(&mut index, 100, Some("big"));
        assert_eq!(evicted, vec!["old".to_string()]);
        assert_eq!(index.len(), 1);
        assert_eq!(occupied_size(&index), 95);
    }
}
