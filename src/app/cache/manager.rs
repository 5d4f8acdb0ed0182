//! Content-addressed result cache
//!
//! Each stored result is one JSON artifact named after its signature, plus
//! an entry in a single index file. The in-memory index lives behind an
//! async `RwLock`; every mutation (store, hit refresh, eviction) is applied
//! and persisted while the write lock is held, so index writers are
//! serialized. A store writes its artifact under the same lock, which lets
//! housekeeping treat any unindexed file it finds as a leftover. Artifact
//! reads happen outside the lock.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::app::hash::QuerySignature;
use crate::app::models::{GeoConstraint, TableRows};
use crate::constants::{cache, files};
use crate::errors::{CacheError, CacheResult};

use super::atomic::write_atomic;
use super::config::CacheConfig;
use super::entry::{CacheEntry, CacheHit, CacheIndex, CachedArtifact, PruneReport, INDEX_VERSION};
use super::retention::{partition_by_age, retention_cutoff, select_for_size_limits};
use super::stats::CacheStats;

/// Disk-backed store of previously fetched query results
#[derive(Debug)]
pub struct ResultCache {
    /// Configuration
    config: CacheConfig,
    /// Cache root directory
    cache_root: PathBuf,
    /// Directory holding artifacts and the index
    results_dir: PathBuf,
    /// Index file path
    index_path: PathBuf,
    /// Signature -> entry table
    index: RwLock<CacheIndex>,
}

impl ResultCache {
    /// Open the cache, creating directories and loading the index
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the cache directory cannot be created. A corrupt
    /// index is not an error: it is logged and replaced by an empty one.
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let cache_root = config.resolve_root()?;
        let results_dir = cache_root.join(cache::RESULTS_DIR);
        Self::ensure_directory_exists(&results_dir).await?;

        let index_path = results_dir.join(cache::INDEX_FILE);
        let index = Self::load_index(&index_path).await;

        info!(
            "Initialized result cache with root: {} ({} entries)",
            cache_root.display(),
            index.entries.len()
        );

        Ok(Self {
            config,
            cache_root,
            results_dir,
            index_path,
            index: RwLock::new(index),
        })
    }

    /// Get the cache root directory
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Signature for a query; see [`QuerySignature::compute`]
    pub fn compute_signature(
        year: u16,
        dataset: &str,
        variables: &[String],
        geo: &GeoConstraint,
    ) -> QuerySignature {
        QuerySignature::compute(year, dataset, variables, geo)
    }

    async fn ensure_directory_exists(path: &Path) -> CacheResult<()> {
        if !path.exists() {
            fs::create_dir_all(path).await.map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: path.to_path_buf(),
                }
            })?;
            debug!("Created cache directory: {}", path.display());
        }
        Ok(())
    }

    async fn load_index(path: &Path) -> CacheIndex {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheIndex::new(),
            Err(e) => {
                warn!("Cannot read cache index {}: {}; starting empty", path.display(), e);
                return CacheIndex::new();
            }
        };

        match serde_json::from_slice::<CacheIndex>(&content) {
            Ok(index) if index.version == INDEX_VERSION => index,
            Ok(index) => {
                warn!(
                    "Cache index version {} not supported (expected {}); starting empty",
                    index.version, INDEX_VERSION
                );
                CacheIndex::new()
            }
            Err(e) => {
                warn!("Cache index {} is corrupted: {}; starting empty", path.display(), e);
                CacheIndex::new()
            }
        }
    }

    async fn persist_index(&self, index: &CacheIndex) -> CacheResult<()> {
        let content = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path, &content).await
    }

    fn artifact_path(&self, entry: &CacheEntry) -> PathBuf {
        self.results_dir.join(&entry.artifact_path)
    }

    async fn read_artifact(path: &Path, signature: QuerySignature) -> Result<TableRows, String> {
        let content = fs::read(path).await.map_err(|e| e.to_string())?;
        let artifact: CachedArtifact =
            serde_json::from_slice(&content).map_err(|e| e.to_string())?;
        if artifact.signature != signature {
            return Err(format!("artifact holds signature {}", artifact.signature));
        }
        Ok(artifact.rows)
    }

    /// Look up a result by signature
    ///
    /// A hit refreshes `last_accessed_at`. An entry whose artifact is missing
    /// or unreadable is dropped from the index and reported as a miss.
    pub async fn lookup(&self, signature: QuerySignature) -> CacheResult<Option<CacheHit>> {
        let entry = {
            let index = self.index.read().await;
            match index.entries.get(&signature) {
                Some(entry) => entry.clone(),
                None => {
                    debug!("Cache miss for {}", signature);
                    return Ok(None);
                }
            }
        };

        let path = self.artifact_path(&entry);
        let rows = match Self::read_artifact(&path, signature).await {
            Ok(rows) => rows,
            Err(reason) => {
                warn!(
                    "Dropping dangling cache entry {} ({}): {}",
                    signature,
                    path.display(),
                    reason
                );
                self.drop_dangling(&entry).await;
                return Ok(None);
            }
        };

        let mut index = self.index.write().await;
        let refreshed = match index.entries.get_mut(&signature) {
            Some(entry) => {
                entry.last_accessed_at = Utc::now();
                entry.clone()
            }
            None => {
                debug!("Entry {} evicted during lookup", signature);
                return Ok(None);
            }
        };
        if let Err(e) = self.persist_index(&index).await {
            warn!("Failed to persist access time for {}: {}", signature, e);
        }

        debug!("Cache hit for {} ({} rows)", signature, rows.len());
        Ok(Some(CacheHit {
            entry: refreshed,
            rows,
        }))
    }

    /// Remove `read` from the index unless a store has replaced it since
    async fn drop_dangling(&self, read: &CacheEntry) -> bool {
        let mut index = self.index.write().await;
        let unchanged = index.entries.get(&read.signature).is_some_and(|current| {
            current.created_at == read.created_at && current.artifact_path == read.artifact_path
        });
        if !unchanged {
            debug!("Entry {} was replaced; keeping it", read.signature);
            return false;
        }

        let mut report = PruneReport::default();
        self.remove_entries(&mut index, &[read.signature], &mut report)
            .await;
        self.persist_or_log(&index, &mut report).await;
        true
    }

    /// Store a fetched result under `signature`
    ///
    /// The artifact and then the index are written atomically, both under
    /// the index write lock; afterwards the soft size caps are enforced
    /// without evicting the entry just stored.
    pub async fn store(
        &self,
        signature: QuerySignature,
        rows: TableRows,
        metadata: BTreeMap<String, String>,
    ) -> CacheResult<CacheEntry> {
        let row_count = rows.len();
        let artifact_path = PathBuf::from(format!(
            "{}.{}",
            signature.to_hex(),
            files::ARTIFACT_EXTENSION
        ));
        let content = serde_json::to_vec(&CachedArtifact { signature, rows })?;

        let mut index = self.index.write().await;
        write_atomic(&self.results_dir.join(&artifact_path), &content).await?;

        let now = Utc::now();
        let entry = CacheEntry {
            signature,
            artifact_path,
            created_at: now,
            last_accessed_at: now,
            row_count,
            size_bytes: content.len() as u64,
            metadata,
        };

        index.entries.insert(signature, entry.clone());
        self.persist_index(&index).await?;
        debug!("Stored {} ({} rows, {} bytes)", signature, row_count, entry.size_bytes);

        let report = self.enforce_limits_locked(&mut index, Some(signature)).await;
        if report.evicted_count() > 0 {
            info!(
                "Evicted {} entries to stay under cache limits",
                report.evicted_count()
            );
        }

        Ok(entry)
    }

    /// [`store`](Self::store) on its own task
    ///
    /// The write runs to completion even if the calling task is aborted, so
    /// an artifact never outlives a cancelled caller without its index entry.
    pub async fn store_detached(
        self: &Arc<Self>,
        signature: QuerySignature,
        rows: TableRows,
        metadata: BTreeMap<String, String>,
    ) -> CacheResult<CacheEntry> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.store(signature, rows, metadata).await })
            .await
            .map_err(|e| CacheError::WriteFailed {
                path: self.results_dir.join(signature.to_hex()),
                reason: e.to_string(),
            })?
    }

    /// Whether an entry exists for `signature`
    pub async fn contains(&self, signature: QuerySignature) -> bool {
        self.index.read().await.entries.contains_key(&signature)
    }

    /// Snapshot of every entry
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.index.read().await.entries.values().cloned().collect()
    }

    /// Evict every entry not accessed within `retention_days`
    ///
    /// File deletion failures are logged and recorded in the report; they
    /// never abort the pass.
    pub async fn prune_by_age(&self, retention_days: u32) -> PruneReport {
        let cutoff = retention_cutoff(retention_days, Utc::now());
        let mut index = self.index.write().await;

        let entries: Vec<CacheEntry> = index.entries.values().cloned().collect();
        let examined = entries.len();
        let (_, evicted) = partition_by_age(entries, cutoff);
        let signatures: Vec<QuerySignature> = evicted.iter().map(|e| e.signature).collect();

        let mut report = PruneReport {
            examined,
            ..Default::default()
        };
        if !signatures.is_empty() {
            self.remove_entries(&mut index, &signatures, &mut report)
                .await;
            self.persist_or_log(&index, &mut report).await;

            info!(
                "Pruned {} of {} cache entries older than {} days",
                report.evicted_count(),
                examined,
                retention_days
            );
        }

        self.sweep_untracked(&index, &mut report).await;
        report
    }

    /// Prune with the configured retention window
    pub async fn prune_expired(&self) -> PruneReport {
        self.prune_by_age(self.config.retention_days).await
    }

    /// Evict least recently accessed entries until under the soft caps
    ///
    /// Files the index does not track are deleted first; they count
    /// against the disk but not against the caps.
    pub async fn enforce_size_limits(&self) -> PruneReport {
        let mut index = self.index.write().await;
        let mut swept = PruneReport::default();
        self.sweep_untracked(&index, &mut swept).await;

        let mut report = self.enforce_limits_locked(&mut index, None).await;
        report.merge(swept);
        report
    }

    async fn enforce_limits_locked(
        &self,
        index: &mut CacheIndex,
        protect: Option<QuerySignature>,
    ) -> PruneReport {
        let entries: Vec<CacheEntry> = index.entries.values().cloned().collect();
        let mut report = PruneReport {
            examined: entries.len(),
            ..Default::default()
        };

        let selected = select_for_size_limits(
            &entries,
            self.config.max_entries,
            self.config.max_cache_size,
            protect,
        );
        if selected.is_empty() {
            return report;
        }

        self.remove_entries(index, &selected, &mut report).await;
        self.persist_or_log(index, &mut report).await;
        report
    }

    /// Remove every entry and artifact
    pub async fn clear(&self) -> CacheResult<PruneReport> {
        let mut index = self.index.write().await;
        let signatures: Vec<QuerySignature> = index.entries.keys().copied().collect();
        let mut report = PruneReport {
            examined: signatures.len(),
            ..Default::default()
        };

        self.remove_entries(&mut index, &signatures, &mut report)
            .await;
        self.persist_index(&index).await?;
        self.sweep_untracked(&index, &mut report).await;

        info!("Cleared {} cache entries", report.evicted_count());
        Ok(report)
    }

    /// Summary of the current index
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.read().await;
        CacheStats::from_index(self.cache_root.clone(), &index)
    }

    async fn remove_entries(
        &self,
        index: &mut CacheIndex,
        signatures: &[QuerySignature],
        report: &mut PruneReport,
    ) {
        for signature in signatures {
            let Some(entry) = index.entries.remove(signature) else {
                continue;
            };
            report.evicted.push(*signature);

            let path = self.artifact_path(&entry);
            match fs::remove_file(&path).await {
                Ok(()) => report.bytes_freed += entry.size_bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete cache artifact {}: {}", path.display(), e);
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }
    }

    /// Delete temp files and artifacts that no index entry references
    ///
    /// Must be called with the index write lock held.
    async fn sweep_untracked(&self, index: &CacheIndex, report: &mut PruneReport) {
        let tracked: HashSet<&Path> = index
            .entries
            .values()
            .map(|entry| entry.artifact_path.as_path())
            .collect();

        let mut listing = match fs::read_dir(&self.results_dir).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Cannot list {}: {}", self.results_dir.display(), e);
                report
                    .failures
                    .push(format!("{}: {}", self.results_dir.display(), e));
                return;
            }
        };

        let mut removed = 0;
        loop {
            let dir_entry = match listing.next_entry().await {
                Ok(Some(dir_entry)) => dir_entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Cannot list {}: {}", self.results_dir.display(), e);
                    report
                        .failures
                        .push(format!("{}: {}", self.results_dir.display(), e));
                    break;
                }
            };

            let file_name = dir_entry.file_name();
            let name = Path::new(&file_name);
            let is_temp = file_name
                .to_string_lossy()
                .ends_with(files::TEMP_FILE_SUFFIX);
            let is_orphan = !is_temp
                && file_name != cache::INDEX_FILE
                && name
                    .extension()
                    .is_some_and(|ext| ext == files::ARTIFACT_EXTENSION)
                && !tracked.contains(name);
            if !is_temp && !is_orphan {
                continue;
            }

            let size = match dir_entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata.len(),
                _ => continue,
            };
            let path = dir_entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed untracked cache file {}", path.display());
                    removed += 1;
                    report.bytes_freed += size;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete untracked file {}: {}", path.display(), e);
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        report.untracked_removed += removed;
        if removed > 0 {
            info!(
                "Removed {} untracked files from {}",
                removed,
                self.results_dir.display()
            );
        }
    }

    async fn persist_or_log(&self, index: &CacheIndex, report: &mut PruneReport) {
        if let Err(e) = self.persist_index(index).await {
            error!("Failed to persist cache index: {}", e);
            report
                .failures
                .push(format!("{}: {}", self.index_path.display(), e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{GeoPair, Level};
    use chrono::Duration;
    use tempfile::TempDir;

    fn rows(n: usize) -> TableRows {
        let mut rows = vec![vec![
            "NAME".to_string(),
            "B01003_001E".to_string(),
            "state".to_string(),
        ]];
        for i in 0..n {
            rows.push(vec![format!("Area {}", i), format!("{}", 1000 + i), "06".to_string()]);
        }
        rows
    }

    fn signature(year: u16) -> QuerySignature {
        let geo = GeoConstraint::target_only(GeoPair::new(Level::State, "06"));
        ResultCache::compute_signature(year, "acs/acs5", &["B01003_001E".to_string()], &geo)
    }

    async fn open(dir: &TempDir) -> ResultCache {
        ResultCache::new(CacheConfig::with_cache_root(dir.path().to_path_buf()))
            .await
            .unwrap()
    }

    async fn backdate(cache: &ResultCache, signature: QuerySignature, days: i64) {
        let mut index = cache.index.write().await;
        let entry = index.entries.get_mut(&signature).unwrap();
        entry.last_accessed_at = Utc::now() - Duration::days(days);
        cache.persist_index(&index).await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_creation() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        assert_eq!(cache.cache_root(), temp_dir.path());
        assert!(temp_dir.path().join(cache::RESULTS_DIR).is_dir());
        assert!(cache.stats().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        let sig = signature(2022);

        let mut metadata = BTreeMap::new();
        metadata.insert("dataset".to_string(), "acs/acs5".to_string());
        let stored = cache.store(sig, rows(3), metadata).await.unwrap();
        assert_eq!(stored.row_count, 4);
        assert!(temp_dir
            .path()
            .join(cache::RESULTS_DIR)
            .join(format!("{}.json", sig))
            .exists());

        let hit = cache.lookup(sig).await.unwrap().unwrap();
        assert_eq!(hit.rows, rows(3));
        assert_eq!(hit.entry.metadata["dataset"], "acs/acs5");
        assert!(hit.entry.last_accessed_at >= stored.last_accessed_at);

        assert!(cache.lookup(signature(2021)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let sig = signature(2020);
        {
            let cache = open(&temp_dir).await;
            cache.store(sig, rows(1), BTreeMap::new()).await.unwrap();
        }

        let cache = open(&temp_dir).await;
        assert!(cache.contains(sig).await);
        assert_eq!(cache.lookup(sig).await.unwrap().unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn test_hit_refreshes_access_time() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        let sig = signature(2019);
        cache.store(sig, rows(1), BTreeMap::new()).await.unwrap();
        backdate(&cache, sig, 40).await;

        cache.lookup(sig).await.unwrap().unwrap();
        let report = cache.prune_by_age(30).await;
        assert_eq!(report.evicted_count(), 0);
        assert!(cache.contains(sig).await);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_a_miss_and_heals() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        let sig = signature(2018);
        let entry = cache.store(sig, rows(2), BTreeMap::new()).await.unwrap();

        fs::remove_file(cache.artifact_path(&entry)).await.unwrap();

        assert!(cache.lookup(sig).await.unwrap().is_none());
        assert!(!cache.contains(sig).await);
    }

    #[tokio::test]
    async fn test_unreadable_artifact_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        let sig = signature(2017);
        let entry = cache.store(sig, rows(2), BTreeMap::new()).await.unwrap();

        fs::write(cache.artifact_path(&entry), b"{ not json").await.unwrap();

        assert!(cache.lookup(sig).await.unwrap().is_none());
        assert!(!cache.contains(sig).await);
    }

    #[tokio::test]
    async fn test_corrupt_index_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let results = temp_dir.path().join(cache::RESULTS_DIR);
        std::fs::create_dir_all(&results).unwrap();
        std::fs::write(results.join(cache::INDEX_FILE), b"garbage").unwrap();

        let cache = open(&temp_dir).await;
        assert!(cache.entries().await.is_empty());

        // and is usable afterwards
        cache.store(signature(2016), rows(1), BTreeMap::new()).await.unwrap();
        assert_eq!(cache.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_by_age_removes_index_entries_and_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;

        let old = signature(2015);
        let fresh = signature(2022);
        let old_entry = cache.store(old, rows(1), BTreeMap::new()).await.unwrap();
        cache.store(fresh, rows(1), BTreeMap::new()).await.unwrap();
        backdate(&cache, old, 31).await;

        let report = cache.prune_by_age(30).await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.evicted, vec![old]);
        assert!(report.bytes_freed > 0);
        assert!(report.failures.is_empty());

        assert!(!cache.artifact_path(&old_entry).exists());
        assert!(!cache.contains(old).await);
        assert!(cache.contains(fresh).await);
    }

    #[tokio::test]
    async fn test_prune_tolerates_already_deleted_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        let sig = signature(2014);
        let entry = cache.store(sig, rows(1), BTreeMap::new()).await.unwrap();
        backdate(&cache, sig, 90).await;
        fs::remove_file(cache.artifact_path(&entry)).await.unwrap();

        let report = cache.prune_by_age(30).await;
        assert_eq!(report.evicted_count(), 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_store_enforces_entry_cap() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            CacheConfig::with_cache_root(temp_dir.path().to_path_buf()).with_max_entries(2);
        let cache = ResultCache::new(config).await.unwrap();

        let first = signature(2010);
        cache.store(first, rows(1), BTreeMap::new()).await.unwrap();
        backdate(&cache, first, 2).await;
        cache.store(signature(2011), rows(1), BTreeMap::new()).await.unwrap();
        cache.store(signature(2012), rows(1), BTreeMap::new()).await.unwrap();

        assert_eq!(cache.entries().await.len(), 2);
        assert!(!cache.contains(first).await);
        assert!(cache.contains(signature(2012)).await);
    }

    fn results_listing(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path().join(cache::RESULTS_DIR))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_size_enforcement_sweeps_untracked_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        let kept = signature(2022);
        cache.store(kept, rows(1), BTreeMap::new()).await.unwrap();

        // What an interrupted store leaves behind
        let results = temp_dir.path().join(cache::RESULTS_DIR);
        let orphan = signature(2013);
        std::fs::write(results.join(format!("{}.json", orphan)), b"{}").unwrap();
        std::fs::write(results.join(format!("{}.json.0badf00d.tmp", kept)), b"{").unwrap();
        std::fs::write(results.join("index.json.12345678.tmp"), b"{").unwrap();

        let report = cache.enforce_size_limits().await;
        assert_eq!(report.untracked_removed, 3);
        assert_eq!(report.evicted_count(), 0);
        assert!(report.failures.is_empty());
        assert_eq!(
            results_listing(&temp_dir),
            vec![format!("{}.json", kept), cache::INDEX_FILE.to_string()]
        );
        assert!(cache.lookup(kept).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_removes_untracked_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        cache.store(signature(2020), rows(1), BTreeMap::new()).await.unwrap();
        let results = temp_dir.path().join(cache::RESULTS_DIR);
        std::fs::write(results.join(format!("{}.json", signature(2012))), b"{}").unwrap();

        let report = cache.clear().await.unwrap();
        assert_eq!(report.evicted_count(), 1);
        assert_eq!(report.untracked_removed, 1);
        assert_eq!(results_listing(&temp_dir), vec![cache::INDEX_FILE.to_string()]);
    }

    #[tokio::test]
    async fn test_failed_read_keeps_a_replaced_entry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        let sig = signature(2011);
        let read = cache.store(sig, rows(1), BTreeMap::new()).await.unwrap();

        // A newer store lands after the failed read picked up `read`
        let replaced = cache.store(sig, rows(2), BTreeMap::new()).await.unwrap();
        {
            let mut index = cache.index.write().await;
            index.entries.get_mut(&sig).unwrap().created_at = read.created_at + Duration::seconds(1);
        }

        assert!(!cache.drop_dangling(&read).await);
        assert!(cache.contains(sig).await);
        assert_eq!(cache.lookup(sig).await.unwrap().unwrap().rows, rows(2));
        assert_eq!(replaced.artifact_path, read.artifact_path);

        let current = cache.index.read().await.entries[&sig].clone();
        assert!(cache.drop_dangling(&current).await);
        assert!(!cache.contains(sig).await);
    }

    #[tokio::test]
    async fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir).await;
        cache.store(signature(2020), rows(1), BTreeMap::new()).await.unwrap();
        cache.store(signature(2021), rows(1), BTreeMap::new()).await.unwrap();

        let report = cache.clear().await.unwrap();
        assert_eq!(report.evicted_count(), 2);
        assert!(cache.stats().await.is_empty());
        assert!(cache.lookup(signature(2020)).await.unwrap().is_none());
    }
}
