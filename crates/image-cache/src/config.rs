use std::env;
use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{ImageCacheError, Result};

pub const DEFAULT_MAX_SIZE_MB: u64 = 50;

/// Directory name used under the system temp dir when no store dir is given
pub const DEFAULT_DIR_NAME: &str = "AYON_IMG_CACHE";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Cache configuration, fixed for the lifetime of a cache instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Explicit store directory; `None` selects the per-user temp location
    pub store_dir: Option<PathBuf>,
    pub max_size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }
}

impl CacheConfig {
    pub fn new(max_size_mb: u64) -> Self {
        Self {
            store_dir: None,
            max_size_mb,
        }
    }

    pub fn with_store_dir(mut self, store_dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(store_dir.into());
        self
    }

    /// Parse configuration from `IMAGE_CACHE_DIR` and `IMAGE_CACHE_MAX_MB`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let store_dir = lookup("IMAGE_CACHE_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let max_size_mb = match lookup("IMAGE_CACHE_MAX_MB") {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid IMAGE_CACHE_MAX_MB, using default");
                DEFAULT_MAX_SIZE_MB
            }),
            None => DEFAULT_MAX_SIZE_MB,
        };

        Self {
            store_dir,
            max_size_mb,
        }
    }

    /// Validated size limit in bytes
    pub fn max_size_bytes(&self) -> Result<u64> {
        if self.max_size_mb == 0 {
            return Err(ImageCacheError::Config(
                "max_size_mb must be positive".to_string(),
            ));
        }
        self.max_size_mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
            ImageCacheError::Config(format!("max_size_mb {} is too large", self.max_size_mb))
        })
    }

    /// Resolve the store directory, creating it if needed
    pub fn resolve_store_dir(&self) -> Result<PathBuf> {
        match &self.store_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(dir.clone())
            }
            None => default_store_dir(),
        }
    }
}

/// Per-user temp location, readable and writable by the owner only
pub fn default_store_dir() -> Result<PathBuf> {
    let dir = env::temp_dir().join(DEFAULT_DIR_NAME);
    fs::create_dir_all(&dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }

    info!(cache_dir = ?dir, "Using default image cache directory");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.store_dir, None);
        assert_eq!(config.max_size_mb, 50);
        assert_eq!(config.max_size_bytes().unwrap(), 50 * 1024 * 1024);
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = CacheConfig::new(0).max_size_bytes().unwrap_err();
        assert!(matches!(err, ImageCacheError::Config(_)));
    }

    #[test]
    fn test_overflowing_size_rejected() {
        let err = CacheConfig::new(u64::MAX).max_size_bytes().unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("IMAGE_CACHE_DIR", "/var/cache/thumbs"),
            ("IMAGE_CACHE_MAX_MB", "128"),
        ]));
        assert_eq!(config.store_dir, Some(PathBuf::from("/var/cache/thumbs")));
        assert_eq!(config.max_size_mb, 128);
    }

    #[test]
    fn test_from_lookup_falls_back_on_bad_values() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("IMAGE_CACHE_DIR", "  "),
            ("IMAGE_CACHE_MAX_MB", "-3"),
        ]));
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_resolve_explicit_dir_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("nested").join("store");
        let config = CacheConfig::new(1).with_store_dir(&store);

        let resolved = config.resolve_store_dir().unwrap();
        assert_eq!(resolved, store);
        assert!(store.is_dir());
    }

    #[test]
    fn test_default_store_dir_is_application_specific() {
        let dir = default_store_dir().unwrap();
        assert_eq!(dir, env::temp_dir().join("AYON_IMG_CACHE"));
        assert!(dir.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_default_store_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = default_store_dir().unwrap();
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
