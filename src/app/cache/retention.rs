//! Age and size based eviction rules
//!
//! The rules are pure functions over entries so the result cache and the
//! user history log apply exactly the same cutoff.

use chrono::{DateTime, Duration, Utc};

use super::entry::CacheEntry;
use crate::app::hash::QuerySignature;

/// Anything that ages out by last activity
pub trait Aged {
    fn last_activity(&self) -> DateTime<Utc>;
}

impl Aged for CacheEntry {
    fn last_activity(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }
}

/// Oldest surviving activity time for a retention window
pub fn retention_cutoff(retention_days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(retention_days))
}

/// Split items into `(surviving, evicted)` by last activity
///
/// Items whose last activity is strictly older than `cutoff` are evicted.
/// Relative order is preserved in both halves.
pub fn partition_by_age<T: Aged>(items: Vec<T>, cutoff: DateTime<Utc>) -> (Vec<T>, Vec<T>) {
    items
        .into_iter()
        .partition(|item| item.last_activity() >= cutoff)
}

/// Signatures to evict so the cache fits under the soft caps
///
/// Least recently accessed entries go first. `protect` is never selected,
/// so a result just stored survives even if it alone exceeds the caps.
/// A cap of 0 means unlimited.
pub fn select_for_size_limits(
    entries: &[CacheEntry],
    max_entries: usize,
    max_bytes: u64,
    protect: Option<QuerySignature>,
) -> Vec<QuerySignature> {
    let mut by_age: Vec<&CacheEntry> = entries.iter().collect();
    by_age.sort_by(|a, b| {
        a.last_accessed_at
            .cmp(&b.last_accessed_at)
            .then_with(|| a.signature.cmp(&b.signature))
    });

    let mut count = entries.len();
    let mut bytes: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let mut selected = Vec::new();

    for entry in by_age {
        let over_count = max_entries > 0 && count > max_entries;
        let over_bytes = max_bytes > 0 && bytes > max_bytes;
        if !over_count && !over_bytes {
            break;
        }
        if Some(entry.signature) == protect {
            continue;
        }
        count -= 1;
        bytes = bytes.saturating_sub(entry.size_bytes);
        selected.push(entry.signature);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn entry(byte: u8, idle_days: i64, size_bytes: u64, now: DateTime<Utc>) -> CacheEntry {
        let signature = QuerySignature::from_bytes([byte; 16]);
        CacheEntry {
            signature,
            artifact_path: PathBuf::from(format!("{}.json", signature)),
            created_at: now - Duration::days(idle_days + 10),
            last_accessed_at: now - Duration::days(idle_days),
            row_count: 2,
            size_bytes,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_partition_by_last_access() {
        let now = Utc::now();
        let entries = vec![entry(1, 40, 10, now), entry(2, 5, 10, now), entry(3, 31, 10, now)];
        let (surviving, evicted) = partition_by_age(entries, retention_cutoff(30, now));

        assert_eq!(surviving.len(), 1);
        assert_eq!(surviving[0].signature, QuerySignature::from_bytes([2; 16]));
        assert_eq!(evicted.len(), 2);
    }

    #[test]
    fn test_created_at_is_ignored() {
        let now = Utc::now();
        // created 15 days ago but touched today
        let fresh = entry(1, 0, 10, now);
        assert!(fresh.created_at < retention_cutoff(10, now));
        let (surviving, evicted) = partition_by_age(vec![fresh], retention_cutoff(10, now));
        assert_eq!(surviving.len(), 1);
        assert!(evicted.is_empty());
    }

    #[test]
    fn test_empty_partition() {
        let (surviving, evicted) =
            partition_by_age(Vec::<CacheEntry>::new(), retention_cutoff(30, Utc::now()));
        assert!(surviving.is_empty());
        assert!(evicted.is_empty());
    }

    #[test]
    fn test_size_limits_evict_least_recent_first() {
        let now = Utc::now();
        let entries = vec![entry(1, 1, 100, now), entry(2, 3, 100, now), entry(3, 2, 100, now)];

        let by_count = select_for_size_limits(&entries, 2, 0, None);
        assert_eq!(by_count, vec![QuerySignature::from_bytes([2; 16])]);

        let by_bytes = select_for_size_limits(&entries, 0, 150, None);
        assert_eq!(
            by_bytes,
            vec![
                QuerySignature::from_bytes([2; 16]),
                QuerySignature::from_bytes([3; 16])
            ]
        );

        assert!(select_for_size_limits(&entries, 0, 0, None).is_empty());
    }

    #[test]
    fn test_size_limits_skip_protected() {
        let now = Utc::now();
        let entries = vec![entry(1, 1, 100, now), entry(2, 3, 100, now)];
        let protected = QuerySignature::from_bytes([2; 16]);
        let selected = select_for_size_limits(&entries, 1, 0, Some(protected));
        assert_eq!(selected, vec![QuerySignature::from_bytes([1; 16])]);
    }
}
