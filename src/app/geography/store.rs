//! On-disk cache of area enumerations
//!
//! One JSON file per `(dataset, year, level, parent)` key. Freshness is
//! judged by file modification time; a file older than the TTL is never
//! returned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, warn};

use crate::app::cache::write_atomic;
use crate::app::models::{slugify, AreaRecord, GeoPair, Level};
use crate::constants::{cache, files};
use crate::errors::{GeoError, GeoResult};

/// Enumerated areas keyed by full name
pub type AreaMap = BTreeMap<String, AreaRecord>;

/// Sorted `token:value` clauses of a parent constraint
pub fn parent_key(parent: &[GeoPair]) -> Vec<String> {
    let mut clauses: Vec<String> = parent.iter().map(GeoPair::clause).collect();
    clauses.sort();
    clauses.dedup();
    clauses
}

/// Disk cache for enumerations
#[derive(Debug, Clone)]
pub struct GeographyStore {
    dir: PathBuf,
    ttl: Duration,
}

impl GeographyStore {
    /// Store under `dir` with the default 30 day TTL
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            ttl: Duration::from_secs(cache::GEOGRAPHY_TTL_DAYS * 24 * 60 * 60),
        }
    }

    /// Override the freshness window
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `{dataset}_{year}_{level}[_{parent}].json` under the store directory
    pub fn file_for(&self, dataset: &str, year: u16, level: Level, parent: &[GeoPair]) -> PathBuf {
        let mut name = format!("{}_{}_{}", slugify(dataset), year, level.slug());
        let parent = parent_key(parent);
        if !parent.is_empty() {
            let parts: Vec<String> = parent.iter().map(|clause| slugify(clause)).collect();
            name.push('_');
            name.push_str(&parts.join("_"));
        }
        self.dir
            .join(format!("{}.{}", name, files::ARTIFACT_EXTENSION))
    }

    /// Fresh enumeration for the key, if any
    ///
    /// Stale, missing and unreadable files all read as `None`.
    pub async fn load(
        &self,
        dataset: &str,
        year: u16,
        level: Level,
        parent: &[GeoPair],
    ) -> Option<AreaMap> {
        self.load_with_age(dataset, year, level, parent)
            .await
            .map(|(areas, _)| areas)
    }

    /// Fresh enumeration together with the age of its file
    pub async fn load_with_age(
        &self,
        dataset: &str,
        year: u16,
        level: Level,
        parent: &[GeoPair],
    ) -> Option<(AreaMap, Duration)> {
        let path = self.file_for(dataset, year, level, parent);
        let metadata = fs::metadata(&path).await.ok()?;
        let modified = metadata.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.ttl {
            debug!("Geography cache {} is stale ({}s old)", path.display(), age.as_secs());
            return None;
        }

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read geography cache {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice::<AreaMap>(&content) {
            Ok(areas) => {
                debug!("Loaded {} areas from {}", areas.len(), path.display());
                Some((areas, age))
            }
            Err(e) => {
                warn!("Geography cache {} is corrupted: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist an enumeration atomically
    pub async fn save(
        &self,
        dataset: &str,
        year: u16,
        level: Level,
        parent: &[GeoPair],
        areas: &AreaMap,
    ) -> GeoResult<PathBuf> {
        let path = self.file_for(dataset, year, level, parent);
        let storage_error = |reason: String| GeoError::Storage {
            path: path.clone(),
            reason,
        };

        let content = serde_json::to_vec_pretty(areas).map_err(|e| storage_error(e.to_string()))?;
        write_atomic(&path, &content)
            .await
            .map_err(|e| storage_error(e.to_string()))?;
        debug!("Saved {} areas to {}", areas.len(), path.display());
        Ok(path)
    }
}
