//! Error types for the image cache

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ImageCacheError {
    /// Invalid construction parameters or conflicting re-configuration
    Config(String),
    /// Empty cache key
    InvalidKey,
    /// The loader returned a path that is not an existing regular file
    MissingArtifact(PathBuf),
    /// The loader itself reported a failure
    Loader(Box<dyn std::error::Error + Send + Sync>),
    /// The artifact can never fit below the eviction target
    TooLarge { size: u64, limit: u64 },
    Io(Box<std::io::Error>),
    /// Metadata index could not be read or written
    Persistence(String),
}

impl fmt::Display for ImageCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::InvalidKey => write!(f, "Cache key cannot be empty"),
            Self::MissingArtifact(path) => {
                write!(f, "Loader returned non-existent file: {}", path.display())
            }
            Self::Loader(err) => write!(f, "Loader failed: {}", err),
            Self::TooLarge { size, limit } => write!(
                f,
                "Artifact of {} bytes exceeds the cache limit of {} bytes",
                size, limit
            ),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Persistence(msg) => write!(f, "Metadata persistence error: {}", msg),
        }
    }
}

impl std::error::Error for ImageCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Loader(err) => Some(err.as_ref()),
            Self::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ImageCacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for ImageCacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImageCacheError>;
