//! Disk-backed result cache and user history
//!
//! Query results are content addressed: each one is stored under the MD5
//! signature of its canonical query, so the same question asked with
//! variables or ancestors in a different order is served from disk.
//!
//! # Key Features
//!
//! - **OS-specific cache directories**: Uses standard system cache locations
//! - **Atomic operations**: Artifacts and the index are written temp-file + rename
//! - **Self-healing lookups**: Entries whose artifact vanished are dropped as misses
//! - **Age-based retention**: Entries and user history share one cutoff rule
//!
//! # Module Organization
//!
//! - [`config`] - Configuration types and defaults
//! - [`entry`] - Index, entry and artifact types
//! - [`retention`] - Age and size eviction rules
//! - [`atomic`] - Temp-file + rename writes
//! - [`history`] - Per-user query history log
//! - [`stats`] - Cache statistics
//! - [`manager`] - The result cache itself
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use census_geo::app::cache::{CacheConfig, ResultCache};
//! use census_geo::app::models::{GeoConstraint, GeoPair, Level};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ResultCache::new(CacheConfig::default()).await?;
//!
//! let geo = GeoConstraint::new(
//!     GeoPair::new(Level::County, "*"),
//!     vec![GeoPair::new(Level::State, "06")],
//! );
//! let variables = vec!["NAME".to_string(), "B01003_001E".to_string()];
//! let signature = ResultCache::compute_signature(2022, "acs/acs5", &variables, &geo);
//!
//! if cache.lookup(signature).await?.is_none() {
//!     let rows = vec![vec!["NAME".to_string(), "B01003_001E".to_string()]];
//!     cache.store(signature, rows, BTreeMap::new()).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod config;
pub mod entry;
pub mod history;
pub mod manager;
pub mod retention;
pub mod stats;

// Re-export main public API
pub use atomic::write_atomic;
pub use config::CacheConfig;
pub use entry::{CacheEntry, CacheHit, CacheIndex, PruneReport};
pub use history::{HistoryLog, HistoryPruneReport, HistoryRecord};
pub use manager::ResultCache;
pub use retention::{partition_by_age, retention_cutoff, Aged};
pub use stats::{format_bytes, CacheStats};
