//! Hierarchy metadata lookup
//!
//! The canonical ancestor ordering for a target level depends on the dataset
//! and year. In the wider system it comes from a remote document store; the
//! engine only needs the [`HierarchyStore`] contract: return the ordered
//! ancestor tokens, or an empty list when unknown, never an error.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::hierarchy::normalize_token;
use crate::app::models::{Level, METRO_AREA_TOKEN};
use crate::errors::{ConfigError, Result};

/// Source of canonical ancestor orderings
pub trait HierarchyStore: Send + Sync {
    /// Ordered ancestor tokens for `target` in `dataset`/`year`; empty if unknown
    fn ordering(&self, dataset: &str, year: u16, target: Level) -> Vec<String>;
}

/// Key for one memoized ordering
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderingKey {
    pub dataset: String,
    pub year: u16,
    pub target: Level,
}

impl OrderingKey {
    pub fn new(dataset: &str, year: u16, target: Level) -> Self {
        Self {
            dataset: dataset.to_string(),
            year,
            target,
        }
    }
}

/// Process-level memo of hierarchy lookups
///
/// Passed into the resolver at construction so tests get an isolated cache
/// and production shares one instance. Empty orderings are memoized too.
#[derive(Debug, Default)]
pub struct OrderingCache {
    entries: RwLock<HashMap<OrderingKey, Arc<Vec<String>>>>,
}

impl OrderingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized ordering for `key`, computing it on first use
    pub fn get_or_insert_with<F>(&self, key: OrderingKey, compute: F) -> Arc<Vec<String>>
    where
        F: FnOnce() -> Vec<String>,
    {
        if let Some(found) = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return Arc::clone(found);
        }

        let ordering = Arc::new(compute());
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(entries.entry(key).or_insert(ordering))
    }

    /// Drop every memoized ordering
    pub fn flush(&self) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let dropped = entries.len();
        entries.clear();
        debug!("Flushed {} memoized hierarchy orderings", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One ordering entry as stored in a hierarchy file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyEntry {
    /// Dataset path, e.g. `acs/acs5`, or `*` for any
    pub dataset: String,
    /// Vintage year; absent means any year
    #[serde(default)]
    pub year: Option<u16>,
    /// Target level token
    pub level: String,
    /// Ancestor tokens, outermost first
    pub ordering: Vec<String>,
}

/// In-memory hierarchy store with optional built-in defaults
///
/// Lookups fall back from exact `(dataset, year)` to `(dataset, any year)`,
/// then `(any dataset, any year)`, then the defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticHierarchyStore {
    entries: HashMap<(String, Option<u16>, Level), Vec<String>>,
    use_defaults: bool,
}

impl StaticHierarchyStore {
    /// Empty store that knows nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the common Census nesting rules
    pub fn with_defaults() -> Self {
        Self {
            entries: HashMap::new(),
            use_defaults: true,
        }
    }

    /// Add an ordering entry
    pub fn with_entry(
        mut self,
        dataset: &str,
        year: Option<u16>,
        target: Level,
        ordering: &[&str],
    ) -> Self {
        self.insert(
            dataset,
            year,
            target,
            ordering.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Insert or replace an ordering entry
    pub fn insert(&mut self, dataset: &str, year: Option<u16>, target: Level, ordering: Vec<String>) {
        let ordering = ordering.iter().map(|t| normalize_token(t)).collect();
        self.entries
            .insert((dataset.to_string(), year, target), ordering);
    }

    /// Load entries from a JSON file holding a list of [`HierarchyEntry`]
    pub async fn load_from_file(path: &Path, use_defaults: bool) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|_| {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        })?;
        let entries: Vec<HierarchyEntry> = serde_json::from_str(&content).map_err(|e| {
            ConfigError::InvalidValue {
                field: "hierarchy".to_string(),
                value: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut store = Self {
            entries: HashMap::new(),
            use_defaults,
        };
        for entry in entries {
            let target = Level::parse(&entry.level).map_err(|e| ConfigError::InvalidValue {
                field: "hierarchy.level".to_string(),
                value: entry.level.clone(),
                reason: e.to_string(),
            })?;
            store.insert(&entry.dataset, entry.year, target, entry.ordering);
        }

        info!(
            "Loaded {} hierarchy orderings from {}",
            store.entries.len(),
            path.display()
        );
        Ok(store)
    }

    fn default_ordering(target: Level) -> Vec<String> {
        let tokens: &[&str] = match target {
            Level::County => &[
                METRO_AREA_TOKEN,
                "metropolitan division",
                "state (or part)",
                "state",
            ],
            Level::CountySubdivision | Level::Tract => &["state", "county"],
            Level::BlockGroup => &["state", "county", "tract"],
            Level::Place
            | Level::CongressionalDistrict
            | Level::SchoolDistrictUnified
            | Level::Zcta => &["state"],
            Level::MetroDivision => &[METRO_AREA_TOKEN],
            Level::StateOrPart => &[METRO_AREA_TOKEN, "metropolitan division"],
            Level::PrincipalCity => &[METRO_AREA_TOKEN, "state (or part)"],
            Level::Division => &["region"],
            _ => &[],
        };
        tokens.iter().map(|t| t.to_string()).collect()
    }
}

impl HierarchyStore for StaticHierarchyStore {
    fn ordering(&self, dataset: &str, year: u16, target: Level) -> Vec<String> {
        let candidates = [
            (dataset.to_string(), Some(year)),
            (dataset.to_string(), None),
            ("*".to_string(), Some(year)),
            ("*".to_string(), None),
        ];

        for (dataset_key, year_key) in candidates {
            if let Some(found) = self.entries.get(&(dataset_key, year_key, target)) {
                return found.clone();
            }
        }

        if self.use_defaults {
            Self::default_ordering(target)
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lookup_precedence() {
        let store = StaticHierarchyStore::new()
            .with_entry("acs/acs5", Some(2022), Level::Tract, &["state", "county"])
            .with_entry("*", None, Level::Tract, &["county"]);

        assert_eq!(
            store.ordering("acs/acs5", 2022, Level::Tract),
            vec!["state", "county"]
        );
        assert_eq!(store.ordering("dec/pl", 2020, Level::Tract), vec!["county"]);
        assert!(store.ordering("acs/acs5", 2022, Level::Place).is_empty());
    }

    #[test]
    fn test_entries_are_normalized() {
        let store = StaticHierarchyStore::new().with_entry(
            "acs/acs5",
            None,
            Level::County,
            &["CBSA", "metdiv"],
        );
        assert_eq!(
            store.ordering("acs/acs5", 2019, Level::County),
            vec![METRO_AREA_TOKEN, "metropolitan division"]
        );
    }

    #[test]
    fn test_defaults() {
        let store = StaticHierarchyStore::with_defaults();
        assert_eq!(
            store.ordering("acs/acs5", 2022, Level::BlockGroup),
            vec!["state", "county", "tract"]
        );
        assert!(store.ordering("acs/acs5", 2022, Level::State).is_empty());
    }

    #[test]
    fn test_ordering_cache_memoizes_and_flushes() {
        let cache = OrderingCache::new();
        let calls = AtomicUsize::new(0);
        let key = OrderingKey::new("acs/acs5", 2022, Level::County);

        for _ in 0..3 {
            let ordering = cache.get_or_insert_with(key.clone(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                vec!["state".to_string()]
            });
            assert_eq!(*ordering, vec!["state".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        cache.flush();
        assert!(cache.is_empty());
        cache.get_or_insert_with(key, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hierarchy.json");
        tokio::fs::write(
            &path,
            r#"[{"dataset": "acs/acs5", "year": 2021, "level": "county", "ordering": ["msa", "state (or part)"]}]"#,
        )
        .await
        .unwrap();

        let store = StaticHierarchyStore::load_from_file(&path, false)
            .await
            .unwrap();
        assert_eq!(
            store.ordering("acs/acs5", 2021, Level::County),
            vec![METRO_AREA_TOKEN, "state (or part)"]
        );
        assert!(store.ordering("acs/acs5", 2020, Level::County).is_empty());
    }
}
