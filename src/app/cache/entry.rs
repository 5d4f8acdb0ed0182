//! Cache index and entry types

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::hash::QuerySignature;
use crate::app::models::TableRows;

/// Current on-disk index format version
pub const INDEX_VERSION: u32 = 1;

/// One cached query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Signature the result is stored under
    pub signature: QuerySignature,
    /// Artifact file, relative to the results directory
    pub artifact_path: PathBuf,
    /// When the result was stored
    pub created_at: DateTime<Utc>,
    /// Last store or hit; retention is measured from here
    pub last_accessed_at: DateTime<Utc>,
    /// Rows in the artifact, header included
    pub row_count: usize,
    /// Artifact size on disk
    pub size_bytes: u64,
    /// Free-form provenance (dataset, label, url, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Days since the entry was last accessed
    pub fn idle_days(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.last_accessed_at).num_days()
    }
}

/// Signature -> entry table persisted as a single JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheIndex {
    pub version: u32,
    pub entries: BTreeMap<QuerySignature, CacheEntry>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}

/// Backing artifact written for each signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub signature: QuerySignature,
    pub rows: TableRows,
}

/// A successful lookup
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub rows: TableRows,
}

/// Summary of an eviction pass
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// Entries considered
    pub examined: usize,
    /// Entries removed from the index
    pub evicted: Vec<QuerySignature>,
    /// Temp files and unindexed artifacts deleted
    pub untracked_removed: usize,
    /// Artifact bytes released
    pub bytes_freed: u64,
    /// Housekeeping failures, logged and otherwise ignored
    pub failures: Vec<String>,
}

impl PruneReport {
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }

    /// Fold another pass into this one
    pub fn merge(&mut self, other: PruneReport) {
        self.examined = self.examined.max(other.examined);
        self.evicted.extend(other.evicted);
        self.untracked_removed += other.untracked_removed;
        self.bytes_freed += other.bytes_freed;
        self.failures.extend(other.failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_serializes_signatures_as_hex_keys() {
        let signature = QuerySignature::from_bytes([7; 16]);
        let now = Utc::now();
        let mut index = CacheIndex::new();
        index.entries.insert(
            signature,
            CacheEntry {
                signature,
                artifact_path: PathBuf::from(format!("{}.json", signature)),
                created_at: now,
                last_accessed_at: now,
                row_count: 3,
                size_bytes: 120,
                metadata: BTreeMap::new(),
            },
        );

        let json = serde_json::to_string(&index).unwrap();
        assert!(json.contains(&format!("\"{}\":", signature.to_hex())));

        let back: CacheIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entries.len(), 1);
        assert_eq!(back.total_bytes(), 120);
        assert_eq!(back.entries[&signature].row_count, 3);
    }
}
