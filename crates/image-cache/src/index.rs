//! Persisted metadata index mapping cache keys to entries

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::CacheEntry;

pub const METADATA_FILE: &str = "cache_metadata.json";

/// Key to entry mapping, reconciled against the filesystem on use
///
/// Entries are kept in a `BTreeMap` so iteration order, and therefore
/// eviction tie-breaking, is deterministic.
#[derive(Debug)]
pub struct MetadataIndex {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl MetadataIndex {
    /// Load the index at `path`, starting empty if it is missing or malformed
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(Some(entries)) => {
                info!(entries = entries.len(), path = ?path, "Loaded cache metadata");
                entries
            }
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, path = ?path, "Failed to load metadata, starting fresh");
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries,
            dirty: false,
        }
    }

    /// Drop entries whose backing file no longer exists
    pub fn validate(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let present = entry.file_path.is_file();
            if !present {
                warn!(key = %key, path = ?entry.file_path, "Cache file missing");
            }
            present
        });

        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
            info!(removed, "Removed invalid cache entries");
        }
        removed
    }

    /// Write the full index, replacing the previous document atomically
    pub fn save(&mut self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        self.dirty = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the in-memory index differs from the last saved document
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Record a hit on `key`
    pub fn touch(&mut self, key: &str, now: f64) -> Option<&CacheEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed = now;
        self.dirty = true;
        Some(entry)
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// Newest access timestamp on record
    pub fn latest_access(&self) -> f64 {
        self.entries
            .values()
            .map(|e| e.last_accessed)
            .fold(0.0, f64::max)
    }
}

/// `Ok(None)` when no document exists yet
fn read_entries(path: &Path) -> Result<Option<BTreeMap<String, CacheEntry>>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read(path)?;
    let doc: BTreeMap<String, Value> = serde_json::from_slice(&raw)?;

    let mut entries = BTreeMap::new();
    for (key, value) in doc {
        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => {
                entries.insert(key, entry);
            }
            Err(e) => warn!(key = %key, error = %e, "Skipping malformed metadata entry"),
        }
    }
    Ok(Some(entries))
}
