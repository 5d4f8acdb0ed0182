//! Cache configuration types and defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

/// Configuration for the result cache, geography cache and history log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for cache storage (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Days an entry may go unaccessed before eviction; also applies to user history
    pub retention_days: u32,
    /// Soft cap on the number of cached results (0 = unlimited)
    pub max_entries: usize,
    /// Soft cap on total artifact bytes (0 = unlimited)
    pub max_cache_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            retention_days: cache::DEFAULT_RETENTION_DAYS,
            max_entries: 0,
            max_cache_size: 0,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with custom cache root
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Set the retention window in days
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Set the soft cap on entry count
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the soft cap on total bytes
    pub fn with_max_cache_size(mut self, max_size: u64) -> Self {
        self.max_cache_size = max_size;
        self
    }

    /// Resolve the cache root, falling back to the OS cache directory
    ///
    /// - macOS: ~/Library/Caches/census-geo
    /// - Linux: ~/.cache/census-geo
    /// - Windows: %LOCALAPPDATA%/census-geo
    pub fn resolve_root(&self) -> CacheResult<PathBuf> {
        match &self.cache_root {
            Some(path) => Ok(path.clone()),
            None => dirs::cache_dir()
                .map(|dir| dir.join(cache::APP_DIR))
                .ok_or_else(|| CacheError::DirectoryNotAccessible {
                    path: PathBuf::from("system cache directory"),
                }),
        }
    }
}
