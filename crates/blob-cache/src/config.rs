//! Cache configuration

use std::path::PathBuf;

/// Environment variable naming the directory-backend root
pub const CACHE_DIR_VAR: &str = "BLOB_CACHE_DIR";
/// Environment variable holding the named-store quota in bytes
pub const QUOTA_VAR: &str = "BLOB_CACHE_QUOTA_BYTES";
/// Environment variable that marks the process as running inside the desktop shell
pub const DESKTOP_SHELL_VAR: &str = "BLOB_CACHE_DESKTOP_SHELL";

/// Configuration shared by both backends
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for the directory backend; one subdirectory per namespace
    pub cache_dir: PathBuf,
    /// Total bytes the in-process named store may hold across all namespaces
    pub quota_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/blobs"),
            quota_bytes: 256 * 1024 * 1024, // 256MB
        }
    }
}

impl CacheConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let cache_dir = lookup(CACHE_DIR_VAR)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let quota_bytes = lookup(QUOTA_VAR)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.quota_bytes);

        Self {
            cache_dir,
            quota_bytes,
        }
    }
}
