//! Core application logic for Census geography queries
//!
//! This module contains the main components: the hierarchy resolver, the
//! geography catalog, the query planner, the on-disk result cache, the
//! Census API client and the concurrent executor that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use census_geo::app::hierarchy::{HierarchyResolver, OrderingCache, StaticHierarchyStore};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = HierarchyResolver::new(
//!     Arc::new(StaticHierarchyStore::with_defaults()),
//!     Arc::new(OrderingCache::default()),
//! );
//!
//! let resolution = resolver.resolve(
//!     "acs/acs5",
//!     2022,
//!     &[("county".to_string(), "*".to_string())],
//!     &[("state".to_string(), "06".to_string())],
//! )?;
//! println!("for={}", resolution.constraint.for_clause());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod geography;
pub mod hash;
pub mod hierarchy;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod worker;

// Re-export main public API
pub use cache::{CacheConfig, CacheStats, HistoryLog, ResultCache};
pub use client::{CensusClient, ClientConfig, RetryPolicy};
pub use geography::{AreaFetcher, AreaMatch, CatalogCache, GeographyCatalog, GeographyStore};
pub use hash::QuerySignature;
pub use hierarchy::{HierarchyResolver, HierarchyStore, OrderingCache, StaticHierarchyStore};
pub use models::{AreaRecord, GeoConstraint, GeoPair, Level, TableRows};
pub use pipeline::{GeoQueryService, GeoRequest, QueryResponse, ResolvedGeography};
pub use planner::{OverflowPolicy, PlannerConfig, QueryPlanner, QuerySpec};
pub use worker::{BatchReport, DataFetcher, ExecutorConfig, QueryExecutor};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(PlannerConfig::default().overflow_policy, OverflowPolicy::Truncate);
    }
}
