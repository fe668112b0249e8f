//! One cache per process, handed out explicitly

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::cache::ImageCache;
use crate::config::CacheConfig;
use crate::error::{ImageCacheError, Result};

/// Owns the process's cache instance
///
/// Created once at startup and passed to whoever needs the cache. Asking for
/// a cache with a configuration that conflicts with the existing instance is
/// an error rather than a silent reuse. After `shutdown` the registry hands
/// out nothing, so two instances never share a store directory.
#[derive(Default)]
pub struct CacheRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    instance: Option<Arc<ImageCache>>,
    closed: bool,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing cache, or open one from `config`
    ///
    /// A request without an explicit store dir matches any existing
    /// instance of the same size.
    pub fn get_or_create(&self, config: &CacheConfig) -> Result<Arc<ImageCache>> {
        let max_size_bytes = config.max_size_bytes()?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(ImageCacheError::Config(
                "cache registry has been shut down".to_string(),
            ));
        }
        if let Some(cache) = state.instance.as_ref() {
            if cache.max_size_bytes() != max_size_bytes {
                return Err(ImageCacheError::Config(format!(
                    "cache already configured with {} bytes, requested {}",
                    cache.max_size_bytes(),
                    max_size_bytes
                )));
            }
            if let Some(dir) = &config.store_dir {
                if dir != cache.store_dir() {
                    return Err(ImageCacheError::Config(format!(
                        "cache already uses {}, requested {}",
                        cache.store_dir().display(),
                        dir.display()
                    )));
                }
            }
            return Ok(Arc::clone(cache));
        }

        let cache = Arc::new(ImageCache::open(config)?);
        state.instance = Some(Arc::clone(&cache));
        Ok(cache)
    }

    pub fn current(&self) -> Option<Arc<ImageCache>> {
        self.state.lock().instance.clone()
    }

    /// Flush the instance's index and close the registry
    ///
    /// Outstanding handles keep working and flush again on drop; later
    /// `get_or_create` calls fail.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(cache) = state.instance.take() {
            cache.flush();
            info!(cache_dir = ?cache.store_dir(), "Image cache shut down");
        }
    }
}
