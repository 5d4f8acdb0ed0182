//! Area enumeration and free-text name resolution
//!
//! - [`catalog`] - The catalog, its fetcher trait and in-process memo
//! - [`store`] - 30-day on-disk enumeration cache
//! - [`matching`] - Tiered fuzzy name matching

pub mod catalog;
pub mod matching;
pub mod store;

pub use catalog::{parse_enumeration, AreaFetcher, CatalogCache, EnumerationRequest, GeographyCatalog};
pub use matching::{match_area, normalize_area_name, AreaMatch, MatchTier};
pub use store::{AreaMap, GeographyStore};
