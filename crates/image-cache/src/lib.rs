//! Disk-backed LRU image cache
//!
//! Stores file artifacts such as avatars and thumbnails under an opaque key,
//! evicts least recently used entries once a size limit is exceeded, and
//! keeps a JSON metadata index so the cache survives restarts.

mod cache;
mod config;
mod error;
mod eviction;
mod hasher;
mod index;
mod registry;
mod types;

pub use cache::ImageCache;
pub use config::{default_store_dir, CacheConfig, DEFAULT_DIR_NAME, DEFAULT_MAX_SIZE_MB};
pub use error::{ImageCacheError, Result};
pub use eviction::{evict_if_needed, eviction_target, occupied_size, EVICTION_TARGET_RATIO};
pub use hasher::cache_filename;
pub use index::{MetadataIndex, METADATA_FILE};
pub use registry::CacheRegistry;
pub use types::{CacheEntry, CacheStats};
