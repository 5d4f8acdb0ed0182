//! Shared stubs and fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use census_geo::app::cache::{CacheConfig, ResultCache};
use census_geo::app::client::RetryPolicy;
use census_geo::app::geography::{
    AreaFetcher, CatalogCache, EnumerationRequest, GeographyCatalog, GeographyStore,
};
use census_geo::app::hierarchy::{HierarchyResolver, OrderingCache, StaticHierarchyStore};
use census_geo::app::models::{Level, TableRows};
use census_geo::app::planner::QuerySpec;
use census_geo::app::worker::{DataFetcher, ExecutorConfig, QueryExecutor};
use census_geo::errors::{FetchError, FetchResult};

const CALIFORNIA_COUNTIES: &str = include_str!("../fixtures/california_counties.json");

/// Enumeration table for the 58 California counties
pub fn california_counties() -> TableRows {
    serde_json::from_str(CALIFORNIA_COUNTIES).unwrap()
}

pub fn state_table() -> TableRows {
    [
        ["NAME", "GEO_ID", "state"],
        ["California", "0400000US06", "06"],
        ["New York", "0400000US36", "36"],
        ["Texas", "0400000US48", "48"],
    ]
    .iter()
    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
    .collect()
}

/// Serves states and California counties; counts every request
#[derive(Default)]
pub struct FixtureAreaFetcher {
    pub calls: AtomicUsize,
    pub offline: AtomicBool,
    pub requests: Mutex<Vec<EnumerationRequest>>,
}

impl FixtureAreaFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl AreaFetcher for FixtureAreaFetcher {
    async fn fetch_areas(&self, request: &EnumerationRequest) -> FetchResult<TableRows> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::ServerError { status: 503 });
        }

        let in_california = request
            .parent
            .iter()
            .any(|pair| pair.level == Level::State && pair.value == "06");
        match request.level {
            Level::State => Ok(state_table()),
            Level::County if in_california => Ok(california_counties()),
            _ => Ok(vec![vec!["NAME".to_string(), request.level.token().to_string()]]),
        }
    }
}

/// Returns a small table per spec; counts every request
#[derive(Default)]
pub struct RecordingDataFetcher {
    pub calls: AtomicUsize,
    pub specs: Mutex<Vec<QuerySpec>>,
}

impl RecordingDataFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataFetcher for RecordingDataFetcher {
    async fn fetch(&self, spec: &QuerySpec) -> FetchResult<TableRows> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());

        let mut header = spec.variables.clone();
        header.push(spec.geo.target.level.token().to_string());
        let mut row: Vec<String> = spec
            .variables
            .iter()
            .map(|v| format!("{}@{}", v, spec.year))
            .collect();
        row.push(spec.geo.target.value.clone());
        Ok(vec![header, row])
    }
}

pub fn resolver() -> HierarchyResolver {
    HierarchyResolver::new(
        Arc::new(StaticHierarchyStore::with_defaults()),
        Arc::new(OrderingCache::new()),
    )
}

pub fn catalog(dir: &TempDir, fetcher: Arc<FixtureAreaFetcher>) -> GeographyCatalog {
    GeographyCatalog::new(
        fetcher,
        GeographyStore::new(dir.path().join("geography")),
        Arc::new(CatalogCache::new(Duration::from_secs(3600))),
    )
    .with_retry(RetryPolicy::none())
}

pub async fn result_cache(dir: &TempDir) -> Arc<ResultCache> {
    Arc::new(
        ResultCache::new(CacheConfig::with_cache_root(dir.path().to_path_buf()))
            .await
            .unwrap(),
    )
}

pub async fn executor(dir: &TempDir, fetcher: Arc<RecordingDataFetcher>) -> QueryExecutor {
    let config = ExecutorConfig::default().with_retry(RetryPolicy::none());
    QueryExecutor::new(config, result_cache(dir).await, fetcher)
}
