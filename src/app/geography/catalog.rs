//! Geography catalog: area enumeration and name lookup
//!
//! Enumerations are served from three layers: an in-process memo, the
//! on-disk [`GeographyStore`], and finally the remote API through an
//! [`AreaFetcher`]. Failed enumerations are never cached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use url::Url;

use super::matching::{match_area, AreaMatch};
use super::store::{parent_key, AreaMap, GeographyStore};
use crate::app::client::{build_query_url, RetryPolicy};
use crate::app::models::{AreaRecord, GeoConstraint, GeoPair, Level, TableRows};
use crate::constants::census;
use crate::errors::{FetchError, FetchResult, GeoError, GeoResult};

/// One request for every area at a level under a parent constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationRequest {
    pub dataset: String,
    pub year: u16,
    pub level: Level,
    pub parent: Vec<GeoPair>,
}

impl EnumerationRequest {
    pub fn new(dataset: &str, year: u16, level: Level, parent: &[GeoPair]) -> Self {
        Self {
            dataset: dataset.to_string(),
            year,
            level,
            parent: parent.to_vec(),
        }
    }

    /// Fields requested for each area
    pub fn fields() -> Vec<String> {
        vec![
            census::NAME_FIELD.to_string(),
            census::GEO_ID_FIELD.to_string(),
        ]
    }

    /// `for={level}:*` plus the parent as `in=`
    pub fn constraint(&self) -> GeoConstraint {
        GeoConstraint::new(
            GeoPair::new(self.level, census::WILDCARD),
            self.parent.clone(),
        )
    }

    /// Remote enumeration URL
    pub fn to_url(&self, base_url: &str, api_key: Option<&str>) -> FetchResult<Url> {
        build_query_url(
            base_url,
            self.year,
            &self.dataset,
            &Self::fields(),
            &self.constraint(),
            api_key,
        )
    }
}

/// Source of raw enumeration tables
#[async_trait]
pub trait AreaFetcher: Send + Sync {
    /// Header row then one row per area; last column is the level's code
    async fn fetch_areas(&self, request: &EnumerationRequest) -> FetchResult<TableRows>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CatalogKey {
    dataset: String,
    year: u16,
    level: Level,
    parent: Vec<String>,
}

impl CatalogKey {
    fn new(dataset: &str, year: u16, level: Level, parent: &[GeoPair]) -> Self {
        Self {
            dataset: dataset.to_string(),
            year,
            level,
            parent: parent_key(parent),
        }
    }
}

/// In-process memo of enumerations loaded this run
///
/// Entries expire with the same TTL as the disk cache, counted from when
/// the data was fetched rather than when it entered the memo.
#[derive(Debug)]
pub struct CatalogCache {
    entries: RwLock<HashMap<CatalogKey, (Instant, Arc<AreaMap>)>>,
    ttl: Duration,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn get(&self, key: &CatalogKey) -> Option<Arc<AreaMap>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|(expires_at, _)| Instant::now() < *expires_at)
            .map(|(_, areas)| Arc::clone(areas))
    }

    fn insert(&self, key: CatalogKey, areas: Arc<AreaMap>) {
        self.insert_aged(key, areas, Duration::ZERO);
    }

    /// Memoize data that was already `age` old when loaded
    fn insert_aged(&self, key: CatalogKey, areas: Arc<AreaMap>, age: Duration) {
        let expires_at = Instant::now() + self.ttl.saturating_sub(age);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, (expires_at, areas));
    }

    /// Drop everything memoized
    pub fn flush(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse an enumeration table into records keyed by full name
///
/// The header must carry a `NAME` column; `GEO_ID` is optional. Rows
/// shorter than the header are skipped.
pub fn parse_enumeration(rows: &TableRows) -> FetchResult<AreaMap> {
    let mut areas = AreaMap::new();
    let Some(header) = rows.first() else {
        return Ok(areas);
    };

    let name_idx = header
        .iter()
        .position(|column| column == census::NAME_FIELD)
        .ok_or_else(|| FetchError::MalformedResponse {
            reason: format!("enumeration header lacks {}: {:?}", census::NAME_FIELD, header),
        })?;
    let geo_id_idx = header
        .iter()
        .position(|column| column == census::GEO_ID_FIELD);

    for row in rows.iter().skip(1) {
        if row.len() < header.len() {
            debug!("Skipping short enumeration row: {:?}", row);
            continue;
        }
        let Some(code) = row.last() else {
            continue;
        };

        let full_name = row[name_idx].clone();
        let record = AreaRecord {
            code: code.clone(),
            composite_id: geo_id_idx.map(|i| row[i].clone()).unwrap_or_default(),
            full_name: full_name.clone(),
        };
        if areas.contains_key(&full_name) {
            debug!("Duplicate area name {}, keeping the first", full_name);
            continue;
        }
        areas.insert(full_name, record);
    }

    Ok(areas)
}

/// Discovers named areas and resolves names to codes
pub struct GeographyCatalog {
    fetcher: Arc<dyn AreaFetcher>,
    store: GeographyStore,
    memo: Arc<CatalogCache>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GeographyCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeographyCatalog")
            .field("store", &self.store)
            .field("memo_entries", &self.memo.len())
            .field("retry", &self.retry)
            .finish()
    }
}

impl GeographyCatalog {
    pub fn new(fetcher: Arc<dyn AreaFetcher>, store: GeographyStore, memo: Arc<CatalogCache>) -> Self {
        Self {
            fetcher,
            store,
            memo,
            retry: RetryPolicy::default(),
        }
    }

    /// Use a different retry policy for enumeration requests
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn memo(&self) -> &Arc<CatalogCache> {
        &self.memo
    }

    pub fn store(&self) -> &GeographyStore {
        &self.store
    }

    /// Every area at `level` under `parent`
    ///
    /// Returns an empty map, after logging, when the areas cannot be
    /// enumerated; callers treat that as "unavailable".
    pub async fn enumerate_areas(
        &self,
        dataset: &str,
        year: u16,
        level: Level,
        parent: &[GeoPair],
        force_refresh: bool,
    ) -> Arc<AreaMap> {
        let key = CatalogKey::new(dataset, year, level, parent);

        if !force_refresh {
            if let Some(areas) = self.memo.get(&key) {
                return areas;
            }
            if let Some((areas, age)) = self
                .store
                .load_with_age(dataset, year, level, parent)
                .await
            {
                let areas = Arc::new(areas);
                self.memo.insert_aged(key, Arc::clone(&areas), age);
                return areas;
            }
        }

        let request = EnumerationRequest::new(dataset, year, level, parent);
        let what = format!("Enumerating {} in {} {}", level, dataset, year);
        let rows = match self
            .retry
            .run(&what, || self.fetcher.fetch_areas(&request))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("{} failed: {}", what, e);
                return Arc::new(AreaMap::new());
            }
        };

        let areas = match parse_enumeration(&rows) {
            Ok(areas) => areas,
            Err(e) => {
                error!("{} returned an unusable table: {}", what, e);
                return Arc::new(AreaMap::new());
            }
        };
        if areas.is_empty() {
            warn!("{} returned no areas", what);
            return Arc::new(areas);
        }

        if let Err(e) = self.store.save(dataset, year, level, parent, &areas).await {
            warn!("Failed to persist enumeration: {}", e);
        }
        info!("Enumerated {} areas at level {}", areas.len(), level);

        let areas = Arc::new(areas);
        self.memo.insert(key, Arc::clone(&areas));
        areas
    }

    /// Resolve a free-text area name to its code
    ///
    /// # Errors
    ///
    /// `GeoError::CatalogUnavailable` when the level cannot be enumerated.
    /// A name that matches nothing is `Ok(None)`.
    pub async fn find_area_code(
        &self,
        name: &str,
        level: Level,
        dataset: &str,
        year: u16,
        parent: &[GeoPair],
    ) -> GeoResult<Option<AreaMatch>> {
        let areas = self
            .enumerate_areas(dataset, year, level, parent, false)
            .await;
        if areas.is_empty() {
            return Err(GeoError::CatalogUnavailable {
                dataset: dataset.to_string(),
                year,
                level: level.token().to_string(),
            });
        }

        let found = match_area(name, &areas);
        match &found {
            Some(m) => debug!(
                "Matched '{}' to {} ({}) with confidence {}",
                name, m.record.full_name, m.record.code, m.confidence
            ),
            None => debug!("No {} matching '{}'", level, name),
        }
        Ok(found)
    }
}
