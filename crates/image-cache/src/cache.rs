//! Disk-backed image cache with a persisted metadata index

use std::convert::Infallible;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::{ImageCacheError, Result};
use crate::eviction::{evict_if_needed, occupied_size};
use crate::hasher::cache_filename;
use crate::index::{MetadataIndex, METADATA_FILE};
use crate::types::{unix_now, CacheEntry, CacheStats};

/// Smallest step between two access timestamps
const CLOCK_TICK: f64 = 1e-6;

/// A size-bounded LRU cache of file artifacts keyed by caller-chosen strings
///
/// Every `get` runs inside one critical section, including the loader call,
/// so concurrent callers for the same key invoke the loader only once. The
/// index is flushed when the cache is dropped.
pub struct ImageCache {
    /// Directory holding the cached copies and the metadata index
    store_dir: PathBuf,
    /// Maximum cache size in bytes
    max_size_bytes: u64,
    state: Mutex<CacheState>,
}

struct CacheState {
    index: MetadataIndex,
    /// Last handed-out access timestamp
    clock: f64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    /// Strictly increasing timestamp, even under a coarse or stepping clock
    fn next_stamp(&mut self) -> f64 {
        let now = unix_now();
        self.clock = if now > self.clock {
            now
        } else {
            self.clock + CLOCK_TICK
        };
        self.clock
    }

    /// Hit path; drops the entry if its file has vanished
    fn lookup(&mut self, key: &str) -> Option<PathBuf> {
        let path = self.index.get(key)?.file_path.clone();

        if path.is_file() {
            let stamp = self.next_stamp();
            self.index.touch(key, stamp);
            self.hits += 1;
            debug!(key, "Cache hit");
            return Some(path);
        }

        warn!(key, path = ?path, "Cached file missing, treating as miss");
        self.index.remove(key);
        None
    }
}

impl ImageCache {
    /// Open the cache described by `config`, loading and validating its index
    pub fn open(config: &CacheConfig) -> Result<Self> {
        let max_size_bytes = config.max_size_bytes()?;
        let store_dir = config.resolve_store_dir()?;

        let mut index = MetadataIndex::load(store_dir.join(METADATA_FILE));
        index.validate();
        let clock = index.latest_access();

        info!(
            cache_dir = ?store_dir,
            max_size_mb = config.max_size_mb,
            entries = index.len(),
            "Image cache initialized"
        );

        Ok(Self {
            store_dir,
            max_size_bytes,
            state: Mutex::new(CacheState {
                index,
                clock,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        })
    }

    /// Return the cached path for `key`, calling `loader` on a miss
    ///
    /// `loader` returns the path of a source file which is copied into the
    /// store; the source is left untouched.
    pub fn get<F, P>(&self, key: &str, loader: F) -> Result<PathBuf>
    where
        F: FnOnce() -> P,
        P: Into<PathBuf>,
    {
        self.try_get(key, || Ok::<P, Infallible>(loader()))
    }

    /// Like [`ImageCache::get`], for loaders that can fail
    pub fn try_get<F, P, E>(&self, key: &str, loader: F) -> Result<PathBuf>
    where
        F: FnOnce() -> std::result::Result<P, E>,
        P: Into<PathBuf>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if key.is_empty() {
            return Err(ImageCacheError::InvalidKey);
        }

        let mut state = self.state.lock();

        if let Some(path) = state.lookup(key) {
            return Ok(path);
        }

        state.misses += 1;
        debug!(key, "Cache miss, calling loader");

        let source: PathBuf = loader()
            .map_err(|e| ImageCacheError::Loader(e.into()))?
            .into();
        if !source.is_file() {
            return Err(ImageCacheError::MissingArtifact(source));
        }

        let source_size = fs::metadata(&source)?.len();
        if source_size > self.max_size_bytes {
            return Err(ImageCacheError::TooLarge {
                size: source_size,
                limit: self.max_size_bytes,
            });
        }

        let cached_path = self.store_dir.join(cache_filename(key, &source));
        copy_into_store(&source, &cached_path)?;

        let size_bytes = match fs::metadata(&cached_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                let _ = fs::remove_file(&cached_path);
                return Err(e.into());
            }
        };

        let stamp = state.next_stamp();
        state.index.insert(
            key.to_string(),
            CacheEntry {
                file_path: cached_path.clone(),
                size_bytes,
                access_count: 1,
                last_accessed: stamp,
            },
        );

        let evicted = evict_if_needed(&mut state.index, self.max_size_bytes, Some(key));
        state.evictions += evicted.len() as u64;

        info!(key, path = ?cached_path, size_bytes, "Cached file");
        Ok(cached_path)
    }

    /// Persist the index if it changed since the last save
    ///
    /// Save failures are logged; the cache keeps working from memory.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        if !state.index.is_dirty() {
            return;
        }

        match state.index.save() {
            Ok(()) => info!(entries = state.index.len(), "Cache metadata saved"),
            Err(e) => error!(error = %e, path = ?state.index.path(), "Failed to save cache metadata"),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().index.get(key).is_some()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.index.len(),
            total_size: occupied_size(&state.index),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.store_dir.join(METADATA_FILE)
    }
}

impl fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("store_dir", &self.store_dir)
            .field("max_size_bytes", &self.max_size_bytes)
            .finish_non_exhaustive()
    }
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Copy through a `.part` sibling so the final name never holds a partial file
fn copy_into_store(source: &Path, dest: &Path) -> Result<()> {
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = fs::copy(source, &partial).and_then(|_| fs::rename(&partial, dest)) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}
