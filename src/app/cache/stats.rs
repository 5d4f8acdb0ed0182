//! Cache statistics
//!
//! Summaries are computed from the index alone; the artifacts themselves are
//! never scanned.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::entry::CacheIndex;

/// Snapshot of the result cache
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Cache root directory
    pub cache_root: PathBuf,
    /// Number of cached results
    pub entry_count: usize,
    /// Total artifact size in bytes
    pub total_bytes: u64,
    /// Total rows across all artifacts
    pub total_rows: usize,
    /// Least recent access among entries
    pub oldest_access: Option<DateTime<Utc>>,
    /// Most recent access among entries
    pub newest_access: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Summarise an index
    pub fn from_index(cache_root: PathBuf, index: &CacheIndex) -> Self {
        let entries = index.entries.values();
        Self {
            cache_root,
            entry_count: index.entries.len(),
            total_bytes: index.total_bytes(),
            total_rows: entries.clone().map(|e| e.row_count).sum(),
            oldest_access: entries.clone().map(|e| e.last_accessed_at).min(),
            newest_access: entries.map(|e| e.last_accessed_at).max(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Format cache size in human-readable format
    pub fn format_cache_size(&self) -> String {
        format_bytes(self.total_bytes)
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::entry::CacheEntry;
    use crate::app::hash::QuerySignature;
    use chrono::Duration;
    use std::collections::BTreeMap;

    #[test]
    fn test_stats_from_empty_index() {
        let stats = CacheStats::from_index(PathBuf::from("/cache"), &CacheIndex::new());
        assert!(stats.is_empty());
        assert_eq!(stats.total_bytes, 0);
        assert!(stats.oldest_access.is_none());
        assert_eq!(stats.format_cache_size(), "0 B");
    }

    #[test]
    fn test_stats_from_index() {
        let now = Utc::now();
        let mut index = CacheIndex::new();
        for (byte, days, rows) in [(1u8, 3i64, 10usize), (2, 1, 5)] {
            let signature = QuerySignature::from_bytes([byte; 16]);
            index.entries.insert(
                signature,
                CacheEntry {
                    signature,
                    artifact_path: PathBuf::from(format!("{}.json", signature)),
                    created_at: now - Duration::days(days),
                    last_accessed_at: now - Duration::days(days),
                    row_count: rows,
                    size_bytes: 1024,
                    metadata: BTreeMap::new(),
                },
            );
        }

        let stats = CacheStats::from_index(PathBuf::from("/cache"), &index);
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_rows, 15);
        assert_eq!(stats.format_cache_size(), "2.00 KB");
        assert_eq!(stats.oldest_access, Some(now - Duration::days(3)));
        assert_eq!(stats.newest_access, Some(now - Duration::days(1)));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024_u64.pow(4)), "1.00 TB");
    }
}
