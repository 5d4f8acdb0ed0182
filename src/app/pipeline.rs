//! End-to-end geography query pipeline
//!
//! Resolve the hierarchy, turn area names into codes, plan one query per
//! year and run the batch through the cache-backed executor.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::cache::{HistoryLog, HistoryPruneReport, PruneReport};
use crate::app::geography::{AreaMatch, GeographyCatalog};
use crate::app::hierarchy::{HierarchyResolver, Resolution};
use crate::app::models::{GeoConstraint, GeoPair, Level};
use crate::app::planner::{QueryPlanner, QuerySpec};
use crate::app::worker::{BatchReport, QueryExecutor};
use crate::errors::{GeoError, GeoResult, QueryError, Result};

/// A geography question with its measures and years
#[derive(Debug, Clone, Default)]
pub struct GeoRequest {
    pub dataset: String,
    pub years: Vec<u16>,
    /// Proposed `for` entries as `(token, value)`; the most granular wins
    pub targets: Vec<(String, String)>,
    /// Explicit `in` entries as `(token, value)`
    pub ancestors: Vec<(String, String)>,
    pub measures: Vec<String>,
    /// Records the request in this user's history when set
    pub user_id: Option<String>,
    /// Original question text for the history log
    pub query_text: Option<String>,
}

impl GeoRequest {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Default::default()
        }
    }

    pub fn with_years(mut self, years: &[u16]) -> Self {
        self.years = years.to_vec();
        self
    }

    pub fn with_target(mut self, token: &str, value: &str) -> Self {
        self.targets.push((token.to_string(), value.to_string()));
        self
    }

    pub fn with_ancestor(mut self, token: &str, value: &str) -> Self {
        self.ancestors.push((token.to_string(), value.to_string()));
        self
    }

    pub fn with_measures(mut self, measures: &[&str]) -> Self {
        self.measures = measures.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn for_user(mut self, user_id: &str, query_text: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self.query_text = Some(query_text.to_string());
        self
    }

    /// Year used for hierarchy and catalog lookups: the latest requested
    pub fn reference_year(&self) -> Option<u16> {
        self.years.iter().copied().max()
    }
}

/// A constraint with every named area replaced by its code
#[derive(Debug, Clone)]
pub struct ResolvedGeography {
    pub resolution: Resolution,
    /// Name lookups performed, in hierarchy order
    pub matches: Vec<(Level, AreaMatch)>,
}

impl ResolvedGeography {
    pub fn constraint(&self) -> &GeoConstraint {
        &self.resolution.constraint
    }
}

/// Everything a request produced
#[derive(Debug)]
pub struct QueryResponse {
    pub geography: ResolvedGeography,
    pub specs: Vec<QuerySpec>,
    pub report: BatchReport,
}

/// Joins resolver, catalog, planner and executor
#[derive(Debug)]
pub struct GeoQueryService {
    resolver: HierarchyResolver,
    catalog: GeographyCatalog,
    planner: QueryPlanner,
    executor: QueryExecutor,
    history: Option<Arc<HistoryLog>>,
}

impl GeoQueryService {
    pub fn new(
        resolver: HierarchyResolver,
        catalog: GeographyCatalog,
        planner: QueryPlanner,
        executor: QueryExecutor,
    ) -> Self {
        Self {
            resolver,
            catalog,
            planner,
            executor,
            history: None,
        }
    }

    /// Record requests carrying a user id in `history`
    pub fn with_history(mut self, history: Arc<HistoryLog>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn resolver(&self) -> &HierarchyResolver {
        &self.resolver
    }

    pub fn catalog(&self) -> &GeographyCatalog {
        &self.catalog
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Resolve the hierarchy and look up every named area
    ///
    /// Ancestors are resolved top down, each one scoped by the codes already
    /// resolved above it; the target is scoped by all ancestors.
    ///
    /// # Errors
    ///
    /// `GeoError::AreaNotFound` for an unmatched name and
    /// `GeoError::CatalogUnavailable` when a level cannot be enumerated.
    pub async fn resolve_geography(
        &self,
        dataset: &str,
        year: u16,
        targets: &[(String, String)],
        ancestors: &[(String, String)],
    ) -> GeoResult<ResolvedGeography> {
        let resolution = self.resolver.resolve(dataset, year, targets, ancestors)?;
        let mut matches = Vec::new();

        let mut resolved_ancestors: Vec<GeoPair> =
            Vec::with_capacity(resolution.constraint.ancestors.len());
        for pair in &resolution.constraint.ancestors {
            let pair = self
                .code_for(dataset, year, pair, &resolved_ancestors, &mut matches)
                .await?;
            resolved_ancestors.push(pair);
        }
        let target = self
            .code_for(
                dataset,
                year,
                &resolution.constraint.target,
                &resolved_ancestors,
                &mut matches,
            )
            .await?;

        if matches.is_empty() {
            return Ok(ResolvedGeography {
                resolution,
                matches,
            });
        }

        // Codes can collapse pairs that differed only by spelling
        let mut resolved = self
            .resolver
            .resolve_pairs(dataset, year, vec![target], resolved_ancestors)?;
        resolved.warnings.splice(0..0, resolution.warnings);
        Ok(ResolvedGeography {
            resolution: resolved,
            matches,
        })
    }

    async fn code_for(
        &self,
        dataset: &str,
        year: u16,
        pair: &GeoPair,
        parent: &[GeoPair],
        matches: &mut Vec<(Level, AreaMatch)>,
    ) -> GeoResult<GeoPair> {
        if pair.has_code_value() {
            return Ok(pair.clone());
        }

        let found = self
            .catalog
            .find_area_code(&pair.value, pair.level, dataset, year, parent)
            .await?;
        match found {
            Some(area) => {
                debug!(
                    "Resolved {} '{}' to {} ({})",
                    pair.level, pair.value, area.record.code, area.record.full_name
                );
                let coded = GeoPair::new(pair.level, area.record.code.clone());
                matches.push((pair.level, area));
                Ok(coded)
            }
            None => Err(GeoError::AreaNotFound {
                level: pair.level.token().to_string(),
                query: pair.value.clone(),
            }),
        }
    }

    /// Resolve and plan a request without running it
    pub async fn prepare(&self, request: &GeoRequest) -> Result<(ResolvedGeography, Vec<QuerySpec>)> {
        let year = request.reference_year().ok_or(QueryError::NoYears)?;
        let geography = self
            .resolve_geography(&request.dataset, year, &request.targets, &request.ancestors)
            .await?;
        info!("Resolved geography: {}", geography.constraint());
        for warning in &geography.resolution.warnings {
            warn!("{}", warning);
        }

        let specs = self.planner.plan(
            &request.years,
            geography.constraint(),
            &request.dataset,
            &request.measures,
        )?;
        Ok((geography, specs))
    }

    /// Resolve, plan and run a request
    pub async fn execute(&self, request: &GeoRequest) -> Result<QueryResponse> {
        let (geography, specs) = self.prepare(request).await?;
        self.record_history(request, &geography, &specs).await;
        let report = self.executor.run(specs.clone()).await;
        Ok(QueryResponse {
            geography,
            specs,
            report,
        })
    }

    /// Like [`execute`](Self::execute), abandoning outstanding queries when
    /// `shutdown_rx` fires
    pub async fn execute_with_shutdown(
        &self,
        request: &GeoRequest,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<QueryResponse> {
        let (geography, specs) = self.prepare(request).await?;
        self.record_history(request, &geography, &specs).await;
        let report = self
            .executor
            .run_with_shutdown(specs.clone(), shutdown_rx)
            .await;
        Ok(QueryResponse {
            geography,
            specs,
            report,
        })
    }

    async fn record_history(
        &self,
        request: &GeoRequest,
        geography: &ResolvedGeography,
        specs: &[QuerySpec],
    ) {
        let (Some(history), Some(user_id)) = (&self.history, &request.user_id) else {
            return;
        };
        let text = request.query_text.clone().unwrap_or_else(|| {
            format!(
                "{} {} for {}",
                request.dataset,
                request.measures.join(","),
                geography.constraint()
            )
        });
        let signature = specs.first().map(|spec| spec.cache_key);
        if let Err(e) = history.append(user_id, &text, signature).await {
            warn!("Failed to record history for {}: {}", user_id, e);
        }
    }

    /// Apply the configured retention to the result cache and user history
    pub async fn prune_expired(&self) -> (PruneReport, Option<HistoryPruneReport>) {
        let cache = self.executor.cache();
        let days = cache.config().retention_days;
        let results = cache.prune_by_age(days).await;
        let history = match &self.history {
            Some(history) => Some(history.prune_by_age(days).await),
            None => None,
        };
        (results, history)
    }
}
