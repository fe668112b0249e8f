//! Cache types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata for a cached artifact, as stored in the metadata index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file_path: PathBuf,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub access_count: u64,
    /// Unix timestamp in seconds
    #[serde(default)]
    pub last_accessed: f64,
}

impl CacheEntry {
    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.last_accessed.floor();
        let nanos = ((self.last_accessed - secs) * 1e9) as u32;
        Utc.timestamp_opt(secs as i64, nanos).single()
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Current time as fractional Unix seconds
pub(crate) fn unix_now() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}
