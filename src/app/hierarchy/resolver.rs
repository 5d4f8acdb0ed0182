//! Canonical ordering of nested geography constraints
//!
//! The API rejects `in=` clauses whose ancestors are listed in the wrong
//! order, and the required order differs by dataset, year and target level.
//! The resolver picks the true target, folds everything else into the
//! ancestor set, and sorts that set against the canonical ordering.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::store::{HierarchyStore, OrderingCache, OrderingKey};
use super::tokens::normalize_token;
use crate::app::models::{GeoConstraint, GeoPair, Level};
use crate::errors::{GeoError, GeoResult};

/// Outcome of resolving a set of geography constraints
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Target plus canonically ordered ancestors
    pub constraint: GeoConstraint,
    /// Whether a canonical ordering was found for the target
    pub ordering_found: bool,
    /// Recoverable degradations noticed while resolving
    pub warnings: Vec<String>,
}

/// Orders geography constraints according to the dataset hierarchy
pub struct HierarchyResolver {
    store: Arc<dyn HierarchyStore>,
    cache: Arc<OrderingCache>,
}

impl std::fmt::Debug for HierarchyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyResolver")
            .field("cached_orderings", &self.cache.len())
            .finish()
    }
}

impl HierarchyResolver {
    /// Create a resolver over `store`, memoizing lookups in `cache`
    pub fn new(store: Arc<dyn HierarchyStore>, cache: Arc<OrderingCache>) -> Self {
        Self { store, cache }
    }

    /// The memo this resolver writes to
    pub fn cache(&self) -> &Arc<OrderingCache> {
        &self.cache
    }

    /// Canonical ancestor tokens for `target`, memoized per key
    pub fn canonical_ordering(&self, dataset: &str, year: u16, target: Level) -> Arc<Vec<String>> {
        let key = OrderingKey::new(dataset, year, target);
        self.cache.get_or_insert_with(key, || {
            let ordering: Vec<String> = self
                .store
                .ordering(dataset, year, target)
                .iter()
                .map(|token| normalize_token(token))
                .collect();
            debug!(
                "Hierarchy ordering for {} {} {}: {:?}",
                dataset, year, target, ordering
            );
            ordering
        })
    }

    /// Resolve raw `(token, value)` constraints
    ///
    /// `targets` are the proposed `for` entries; the most granular one wins
    /// and the rest are demoted to ancestors. `ancestors` are explicit `in`
    /// entries. Unknown tokens are rejected.
    pub fn resolve(
        &self,
        dataset: &str,
        year: u16,
        targets: &[(String, String)],
        ancestors: &[(String, String)],
    ) -> GeoResult<Resolution> {
        let targets = targets
            .iter()
            .map(|(token, value)| GeoPair::parse(token, value))
            .collect::<GeoResult<Vec<_>>>()?;
        let ancestors = ancestors
            .iter()
            .map(|(token, value)| GeoPair::parse(token, value))
            .collect::<GeoResult<Vec<_>>>()?;
        self.resolve_pairs(dataset, year, targets, ancestors)
    }

    /// Re-resolve an already built constraint; a no-op on resolver output
    pub fn resolve_constraint(
        &self,
        dataset: &str,
        year: u16,
        constraint: &GeoConstraint,
    ) -> GeoResult<Resolution> {
        self.resolve_pairs(
            dataset,
            year,
            vec![constraint.target.clone()],
            constraint.ancestors.clone(),
        )
    }

    /// Resolve parsed constraints
    pub fn resolve_pairs(
        &self,
        dataset: &str,
        year: u16,
        mut targets: Vec<GeoPair>,
        ancestors: Vec<GeoPair>,
    ) -> GeoResult<Resolution> {
        let target_index = most_granular(&targets).ok_or(GeoError::MissingTarget)?;
        let target = targets.remove(target_index);
        let mut warnings = Vec::new();

        if !targets.is_empty() {
            debug!(
                "Demoting {} target entries to ancestors of {}",
                targets.len(),
                target
            );
        }

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for pair in ancestors.into_iter().chain(targets) {
            if pair == target {
                continue;
            }
            if pair.level == target.level {
                let message = format!(
                    "dropping ancestor {} at the same level as target {}",
                    pair, target
                );
                warn!("{}", message);
                warnings.push(message);
                continue;
            }
            if seen.insert(pair.clone()) {
                merged.push(pair);
            }
        }

        let ordering = self.canonical_ordering(dataset, year, target.level);
        let ordering_found = !ordering.is_empty();

        if ordering_found {
            merged.sort_by(|a, b| {
                let position = |pair: &GeoPair| {
                    ordering
                        .iter()
                        .position(|token| token == pair.level.token())
                        .unwrap_or(usize::MAX)
                };
                position(a)
                    .cmp(&position(b))
                    .then_with(|| a.level.token().cmp(b.level.token()))
                    .then_with(|| a.value.cmp(&b.value))
            });
        } else if !merged.is_empty() {
            let message = format!(
                "no canonical hierarchy for {} in {} {}; keeping caller order",
                target.level, dataset, year
            );
            warn!("{}", message);
            warnings.push(message);
        }

        Ok(Resolution {
            constraint: GeoConstraint::new(target, merged),
            ordering_found,
            warnings,
        })
    }
}

/// Index of the most granular pair; the first one wins ties
fn most_granular(pairs: &[GeoPair]) -> Option<usize> {
    let mut best: Option<(usize, u8)> = None;
    for (index, pair) in pairs.iter().enumerate() {
        let rank = pair.level.granularity();
        match best {
            Some((_, best_rank)) if best_rank >= rank => {}
            _ => best = Some((index, rank)),
        }
    }
    best.map(|(index, _)| index)
}
