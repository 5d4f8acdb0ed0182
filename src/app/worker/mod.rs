//! Concurrent query execution
//!
//! A batch of planned specs is run on a bounded pool of tokio tasks. Each
//! unit looks its signature up in the result cache, fetches on a miss with
//! capped exponential backoff, and stores what it fetched.
//!
//! # Key Features
//!
//! - **Bounded concurrency**: a semaphore caps in-flight fetches
//! - **Isolation**: one failing spec never cancels its siblings
//! - **Graceful shutdown**: outstanding specs are abandoned on request and
//!   reported as cancelled; cache writes are all-or-nothing
//!
//! # Module Organization
//!
//! - [`config`] - Executor configuration with validation
//! - [`types`] - Per-spec outcomes and batch reports
//! - [`pool`] - The executor and its fetcher trait
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use census_geo::app::cache::{CacheConfig, ResultCache};
//! use census_geo::app::client::CensusClient;
//! use census_geo::app::models::{GeoConstraint, GeoPair, Level};
//! use census_geo::app::planner::QueryPlanner;
//! use census_geo::app::worker::{ExecutorConfig, QueryExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(ResultCache::new(CacheConfig::default()).await?);
//! let client = Arc::new(CensusClient::new()?);
//! let executor = QueryExecutor::new(ExecutorConfig::default(), cache, client);
//!
//! let geo = GeoConstraint::target_only(GeoPair::new(Level::State, "*"));
//! let specs = QueryPlanner::default().plan(
//!     &[2021, 2022],
//!     &geo,
//!     "acs/acs5",
//!     &["B01003_001E".to_string()],
//! )?;
//!
//! let report = executor.run(specs).await;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod pool;
pub mod types;

// Re-export main public API
pub use config::ExecutorConfig;
pub use pool::{DataFetcher, QueryExecutor};
pub use types::{BatchReport, QueryData, QueryOutcome, ResultSource};
