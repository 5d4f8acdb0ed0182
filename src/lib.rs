//! census_geo library
//!
//! Geography resolution and query caching for the US Census Bureau data API.
//! Turns loosely specified geography (area names, levels, parents) into
//! valid `for`/`in` query parameters, plans per-year requests and serves
//! repeated queries from a content-addressed on-disk cache.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
