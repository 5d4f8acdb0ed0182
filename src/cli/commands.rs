//! Command handlers for the census_geo CLI
//!
//! This module implements the command handlers that wire configuration,
//! the Census client and the cache into the core application components.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::cache::{format_bytes, CacheConfig, HistoryLog, ResultCache};
use crate::app::client::{CensusClient, ClientConfig};
use crate::app::geography::{CatalogCache, GeographyCatalog, GeographyStore};
use crate::app::hierarchy::{
    HierarchyResolver, HierarchyStore, OrderingCache, StaticHierarchyStore,
};
use crate::app::models::{GeoPair, Level, TableRows};
use crate::app::pipeline::{GeoQueryService, GeoRequest};
use crate::app::planner::{PlannerConfig, QueryPlanner};
use crate::app::worker::{DataFetcher, ExecutorConfig, QueryExecutor};
use crate::cli::{AreasArgs, CacheAction, CacheArgs, FetchArgs, FindArgs, GlobalArgs, ResolveArgs};
use crate::config::AppConfig;
use crate::constants::cache as cache_layout;
use crate::errors::{AppError, GeoError, Result};

/// Configuration and shared components assembled from config file and flags
struct Runtime {
    config: AppConfig,
    cache_config: CacheConfig,
    client_config: ClientConfig,
    executor_config: ExecutorConfig,
    planner_config: PlannerConfig,
    cache_root: PathBuf,
}

impl Runtime {
    async fn load(global: &GlobalArgs) -> Result<Self> {
        let config = AppConfig::load(global.config.clone()).await?;
        let (mut cache_config, client_config, executor_config, planner_config) =
            config.to_runtime_config()?;

        if let Some(dir) = &global.cache_dir {
            cache_config.cache_root = Some(dir.clone());
        }
        let cache_root = cache_config.resolve_root()?;
        debug!("Using cache root {}", cache_root.display());

        Ok(Self {
            config,
            cache_config,
            client_config,
            executor_config,
            planner_config,
            cache_root,
        })
    }

    fn hierarchy_file<'a>(&'a self, global: &'a GlobalArgs) -> Option<&'a Path> {
        global
            .hierarchy
            .as_deref()
            .or(self.config.geography.hierarchy_file.as_deref())
    }

    async fn resolver(&self, global: &GlobalArgs) -> Result<HierarchyResolver> {
        let store: Arc<dyn HierarchyStore> = match self.hierarchy_file(global) {
            Some(path) => {
                let use_defaults = self.config.geography.use_default_hierarchy;
                Arc::new(StaticHierarchyStore::load_from_file(path, use_defaults).await?)
            }
            None => Arc::new(StaticHierarchyStore::with_defaults()),
        };
        Ok(HierarchyResolver::new(store, Arc::new(OrderingCache::new())))
    }

    fn client(&self) -> Result<Arc<CensusClient>> {
        Ok(Arc::new(CensusClient::new_with_config(
            self.client_config.clone(),
        )?))
    }

    fn catalog(&self, client: Arc<CensusClient>) -> GeographyCatalog {
        let ttl = self.config.geography_ttl();
        let store = GeographyStore::new(self.cache_root.join(cache_layout::GEOGRAPHY_DIR))
            .with_ttl(ttl);
        GeographyCatalog::new(client, store, Arc::new(CatalogCache::new(ttl)))
            .with_retry(self.executor_config.retry.clone())
    }

    async fn result_cache(&self) -> Result<Arc<ResultCache>> {
        Ok(Arc::new(ResultCache::new(self.cache_config.clone()).await?))
    }

    async fn service(&self, global: &GlobalArgs) -> Result<GeoQueryService> {
        let client = self.client()?;
        let executor = QueryExecutor::new(
            self.executor_config.clone(),
            self.result_cache().await?,
            Arc::clone(&client) as Arc<dyn DataFetcher>,
        );
        Ok(GeoQueryService::new(
            self.resolver(global).await?,
            self.catalog(client),
            QueryPlanner::new(self.planner_config.clone()),
            executor,
        ))
    }

    async fn history(&self) -> Result<Arc<HistoryLog>> {
        let dir = self.cache_root.join(cache_layout::HISTORY_DIR);
        Ok(Arc::new(HistoryLog::new(dir).await?))
    }
}

fn parse_parents(parents: &[(String, String)]) -> Result<Vec<GeoPair>> {
    Ok(parents
        .iter()
        .map(|(token, value)| GeoPair::parse(token, value))
        .collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Handle the resolve command
pub async fn handle_resolve(args: ResolveArgs, global: &GlobalArgs) -> Result<()> {
    let runtime = Runtime::load(global).await?;
    let dataset = &args.dataset.dataset;
    let year = args.dataset.year;

    let (resolution, matches) = if args.lookup {
        let service = runtime.service(global).await?;
        let resolved = service
            .resolve_geography(dataset, year, &args.targets, &args.ancestors)
            .await?;
        (resolved.resolution, resolved.matches)
    } else {
        let resolver = runtime.resolver(global).await?;
        let resolution = resolver.resolve(dataset, year, &args.targets, &args.ancestors)?;
        (resolution, Vec::new())
    };

    println!("🧭 Geography Resolution");
    println!("======================");
    println!("Dataset: {} ({})", dataset, year);
    println!("for={}", resolution.constraint.for_clause());
    if let Some(in_clause) = resolution.constraint.in_clause() {
        println!("in={}", in_clause);
    }
    if !resolution.ordering_found {
        println!("⚠️  No hierarchy ordering known for this level; ancestors kept as given");
    }
    for warning in &resolution.warnings {
        println!("⚠️  {}", warning);
    }
    for (level, area) in &matches {
        println!(
            "  {} '{}' -> {} (confidence {:.1})",
            level, area.record.full_name, area.record.code, area.confidence
        );
    }

    Ok(())
}

/// Handle the areas command
pub async fn handle_areas(args: AreasArgs, global: &GlobalArgs) -> Result<()> {
    let runtime = Runtime::load(global).await?;
    let level = Level::parse(&args.level)?;
    let parents = parse_parents(&args.parents)?;
    let catalog = runtime.catalog(runtime.client()?);

    let start = Instant::now();
    let areas = catalog
        .enumerate_areas(
            &args.dataset.dataset,
            args.dataset.year,
            level,
            &parents,
            args.force,
        )
        .await;

    if areas.is_empty() {
        return Err(AppError::generic(format!(
            "No {} areas available for {} {}",
            level, args.dataset.dataset, args.dataset.year
        )));
    }

    println!(
        "📍 {} {} areas ({:.2}s)",
        areas.len(),
        level,
        start.elapsed().as_secs_f64()
    );
    let limit = args.limit.unwrap_or(usize::MAX);
    for (name, record) in areas.iter().take(limit) {
        println!("  {:<8} {}", record.code, name);
    }
    if areas.len() > limit {
        println!("  ... and {} more", areas.len() - limit);
    }

    Ok(())
}

/// Handle the find command
pub async fn handle_find(args: FindArgs, global: &GlobalArgs) -> Result<()> {
    let runtime = Runtime::load(global).await?;
    let level = Level::parse(&args.level)?;
    let parents = parse_parents(&args.parents)?;
    let catalog = runtime.catalog(runtime.client()?);

    let found = catalog
        .find_area_code(
            &args.name,
            level,
            &args.dataset.dataset,
            args.dataset.year,
            &parents,
        )
        .await?;

    match found {
        Some(area) => {
            println!("✅ {} ({})", area.record.full_name, area.record.code);
            println!("   GEO_ID: {}", area.record.composite_id);
            println!("   Match: {:?}, confidence {:.1}", area.tier, area.confidence);
            Ok(())
        }
        None => Err(GeoError::AreaNotFound {
            level: level.token().to_string(),
            query: args.name,
        }
        .into()),
    }
}

/// Handle the fetch command
///
/// Ctrl-C abandons outstanding queries; results already stored stay cached.
pub async fn handle_fetch(args: FetchArgs, global: &GlobalArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    let mut runtime = Runtime::load(global).await?;
    if let Some(policy) = args.overflow {
        runtime.planner_config.overflow_policy = policy;
    }
    if let Some(workers) = args.workers {
        runtime.executor_config.max_concurrent = workers;
        runtime.executor_config.validate()?;
    }

    let mut request = GeoRequest::new(args.dataset.clone()).with_years(&args.years);
    request.targets = args.targets.clone();
    request.ancestors = args.ancestors.clone();
    request.measures = args.measures.clone();
    request.user_id = args.user.clone();

    let start = Instant::now();
    let mut service = runtime.service(global).await?;
    if args.user.is_some() {
        service = service.with_history(runtime.history().await?);
    }

    if args.dry_run {
        let (geography, specs) = service.prepare(&request).await?;
        println!("Geography: {}", geography.constraint());
        println!("Dry run - would run {} queries:", specs.len());
        for spec in &specs {
            println!("  {} [{}]", spec.label, spec.cache_key);
            println!("    get={}", spec.variables.join(","));
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Ctrl-C received - abandoning outstanding queries");
            let _ = shutdown_tx.send(()).await;
        }
    });

    let response = service.execute_with_shutdown(&request, shutdown_rx).await;
    signal_handle.abort();
    let response = response?;
    let report = &response.report;

    println!("📊 Query Results");
    println!("================");
    println!("Geography: {}", response.geography.constraint());
    println!("{}", report.summary());
    for (outcome, data) in report.successes() {
        println!(
            "  ✅ {} ({} rows, {:?})",
            outcome.label,
            data.rows.len().saturating_sub(1),
            data.source
        );
    }
    for (outcome, error) in report.failures() {
        println!("  ❌ {}: {}", outcome.label, error);
    }

    if let Some(path) = &args.output {
        let rows: BTreeMap<&str, &TableRows> = report
            .successes()
            .map(|(outcome, data)| (outcome.label.as_str(), &data.rows))
            .collect();
        let json = serde_json::to_vec_pretty(&rows)
            .map_err(|e| AppError::generic(format!("Failed to serialize results: {}", e)))?;
        tokio::fs::write(path, json).await?;
        println!("💾 Wrote {} result sets to {}", rows.len(), path.display());
    }

    info!("Fetch completed in {:?}", start.elapsed());
    if report.all_succeeded() {
        Ok(())
    } else {
        Err(AppError::generic(format!(
            "{} of {} queries failed",
            report.failed(),
            report.len()
        )))
    }
}

/// Handle cache management commands
pub async fn handle_cache(args: CacheArgs, global: &GlobalArgs) -> Result<()> {
    let runtime = Runtime::load(global).await?;
    match args.action {
        CacheAction::Info => handle_cache_info(&runtime).await,
        CacheAction::Prune { days } => handle_cache_prune(&runtime, days).await,
        CacheAction::Clear => handle_cache_clear(&runtime).await,
    }
}

/// Handle cache information display
async fn handle_cache_info(runtime: &Runtime) -> Result<()> {
    let cache = runtime.result_cache().await?;
    let stats = cache.stats().await;

    println!("💾 Cache Information");
    println!("===================");
    println!("Location: {}", stats.cache_root.display());
    println!("Cached results: {}", stats.entry_count);
    println!("Cached rows: {}", stats.total_rows);
    println!("Cache size: {}", stats.format_cache_size());
    if let (Some(oldest), Some(newest)) = (stats.oldest_access, stats.newest_access) {
        println!("Oldest access: {}", oldest.format("%Y-%m-%d %H:%M"));
        println!("Newest access: {}", newest.format("%Y-%m-%d %H:%M"));
    }
    println!("Retention: {} days", runtime.cache_config.retention_days);

    Ok(())
}

/// Handle age-based pruning of results and history
async fn handle_cache_prune(runtime: &Runtime, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(runtime.cache_config.retention_days);
    let cache = runtime.result_cache().await?;
    let history = runtime.history().await?;

    println!("🧹 Pruning entries unused for {} days", days);
    let results = cache.prune_by_age(days).await;
    let users = history.prune_by_age(days).await;

    println!(
        "Results: {} removed of {} ({} freed)",
        results.evicted_count(),
        results.examined,
        format_bytes(results.bytes_freed)
    );
    println!(
        "History: {} records removed across {} users",
        users.records_removed, users.users_examined
    );
    for failure in results.failures.iter().chain(users.failures.iter()) {
        println!("⚠️  {}", failure);
    }

    Ok(())
}

/// Handle full cache removal
async fn handle_cache_clear(runtime: &Runtime) -> Result<()> {
    let cache = runtime.result_cache().await?;
    let report = cache.clear().await?;

    println!("🗑️  Removed {} cached results", report.evicted_count());
    println!("   Freed {}", format_bytes(report.bytes_freed));
    for failure in &report.failures {
        println!("⚠️  {}", failure);
    }

    Ok(())
}
