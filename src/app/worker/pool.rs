//! Bounded query executor
//!
//! Each spec runs as its own tokio task: cache lookup, then fetch with
//! retry, then store. A semaphore bounds how many run at once. Tasks are
//! independent; a failure in one is recorded in its outcome and never
//! cancels siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::config::ExecutorConfig;
use super::types::{BatchReport, QueryData, QueryOutcome, ResultSource};
use crate::app::cache::ResultCache;
use crate::app::client::RetryPolicy;
use crate::app::models::TableRows;
use crate::app::planner::QuerySpec;
use crate::errors::{FetchError, FetchResult, QueryError};

/// Source of data tables for planned queries
#[async_trait]
pub trait DataFetcher: Send + Sync {
    async fn fetch(&self, spec: &QuerySpec) -> FetchResult<TableRows>;
}

/// Runs batches of query specs against the cache and a fetcher
pub struct QueryExecutor {
    config: ExecutorConfig,
    cache: Arc<ResultCache>,
    fetcher: Arc<dyn DataFetcher>,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("config", &self.config)
            .field("cache", &self.cache.cache_root())
            .finish()
    }
}

/// Shared state cloned into every task
#[derive(Clone)]
struct UnitContext {
    cache: Arc<ResultCache>,
    fetcher: Arc<dyn DataFetcher>,
    retry: RetryPolicy,
    fetch_timeout: Duration,
    semaphore: Arc<Semaphore>,
}

impl QueryExecutor {
    pub fn new(config: ExecutorConfig, cache: Arc<ResultCache>, fetcher: Arc<dyn DataFetcher>) -> Self {
        Self {
            config,
            cache,
            fetcher,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Execute every spec to completion
    pub async fn run(&self, specs: Vec<QuerySpec>) -> BatchReport {
        self.execute(specs, None).await
    }

    /// Execute specs, abandoning outstanding ones when `shutdown_rx` fires
    ///
    /// Abandoned specs are reported as `QueryError::Cancelled`. Dropping the
    /// sender without sending does not cancel anything.
    pub async fn run_with_shutdown(
        &self,
        specs: Vec<QuerySpec>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> BatchReport {
        self.execute(specs, Some(shutdown_rx)).await
    }

    async fn execute(
        &self,
        specs: Vec<QuerySpec>,
        mut shutdown_rx: Option<mpsc::Receiver<()>>,
    ) -> BatchReport {
        let start = Instant::now();
        let total = specs.len();
        info!(
            "Executing {} queries with up to {} concurrent fetches",
            total,
            self.config.max_concurrent.max(1)
        );

        let context = UnitContext {
            cache: Arc::clone(&self.cache),
            fetcher: Arc::clone(&self.fetcher),
            retry: self.config.retry.clone(),
            fetch_timeout: self.config.fetch_timeout,
            semaphore: Arc::new(Semaphore::new(self.config.max_concurrent.max(1))),
        };

        let mut pending = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(total);
        for spec in specs {
            let label = spec.label.clone();
            let year = spec.year;
            let signature = spec.cache_key;

            let handle = tokio::spawn(run_unit(spec, context.clone()));
            abort_handles.push(handle.abort_handle());
            pending.push(async move {
                let joined = handle.await;
                QueryOutcome {
                    label,
                    year,
                    signature,
                    result: flatten_join(joined),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some(outcome) => {
                        if let Err(e) = &outcome.result {
                            warn!("Query {} failed: {}", outcome.label, e);
                        }
                        outcomes.push(outcome);
                    }
                    None => break,
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    warn!("Shutdown requested; abandoning {} outstanding queries", pending.len());
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    while let Some(outcome) = pending.next().await {
                        outcomes.push(outcome);
                    }
                    break;
                }
            }
        }

        let report = BatchReport {
            outcomes,
            elapsed: start.elapsed(),
        };
        info!("{}", report.summary());
        report
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut Option<mpsc::Receiver<()>>) {
    match shutdown_rx {
        Some(rx) => {
            if rx.recv().await.is_none() {
                // Sender dropped without a signal
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

fn flatten_join(joined: Result<Result<QueryData, QueryError>, JoinError>) -> Result<QueryData, QueryError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(QueryError::Cancelled),
        Err(e) => Err(QueryError::WorkerFailed {
            reason: e.to_string(),
        }),
    }
}

async fn run_unit(spec: QuerySpec, context: UnitContext) -> Result<QueryData, QueryError> {
    let _permit = Arc::clone(&context.semaphore)
        .acquire_owned()
        .await
        .map_err(|e| QueryError::WorkerFailed {
            reason: e.to_string(),
        })?;

    match context.cache.lookup(spec.cache_key).await {
        Ok(Some(hit)) => {
            debug!("{} served from cache", spec.label);
            return Ok(QueryData {
                rows: hit.rows,
                source: ResultSource::CacheHit,
            });
        }
        Ok(None) => {}
        Err(e) => warn!("Cache lookup failed for {}: {}; fetching", spec.label, e),
    }

    let rows = context
        .retry
        .run(&spec.label, || fetch_once(&context, &spec))
        .await?;

    if rows.is_empty() {
        debug!("{} returned no rows; not caching", spec.label);
    } else if let Err(e) = context
        .cache
        .store_detached(spec.cache_key, rows.clone(), provenance(&spec))
        .await
    {
        warn!("Failed to cache {}: {}", spec.label, e);
    }

    Ok(QueryData {
        rows,
        source: ResultSource::Fetched,
    })
}

async fn fetch_once(context: &UnitContext, spec: &QuerySpec) -> FetchResult<TableRows> {
    match tokio::time::timeout(context.fetch_timeout, context.fetcher.fetch(spec)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            seconds: context.fetch_timeout.as_secs(),
        }),
    }
}

fn provenance(spec: &QuerySpec) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("dataset".to_string(), spec.dataset.clone());
    metadata.insert("year".to_string(), spec.year.to_string());
    metadata.insert("label".to_string(), spec.label.clone());
    metadata.insert("variables".to_string(), spec.variables.join(","));
    metadata.insert("geo".to_string(), spec.geo.to_string());
    metadata
}
