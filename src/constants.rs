//! Application constants for census_geo
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Environment variable holding the Census API key (optional)
    pub const API_KEY: &str = "CENSUS_API_KEY";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "census-geo/0.1.0 (Geography Resolution Engine)";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 10;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for API requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum attempts for a transiently failing request
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Maximum backoff delay (milliseconds)
    pub const MAX_BACKOFF_MS: u64 = 30_000;

    /// Jitter factor for randomizing delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;
}

/// Census API endpoints and field names
pub mod census {
    /// Census data API base URL
    pub const BASE_URL: &str = "https://api.census.gov/data";

    /// Display name field, always requested first
    pub const NAME_FIELD: &str = "NAME";

    /// Composite geography identifier field
    pub const GEO_ID_FIELD: &str = "GEO_ID";

    /// Wildcard value selecting every area at a level
    pub const WILDCARD: &str = "*";

    /// Dataset used when none is given on the command line
    pub const DEFAULT_DATASET: &str = "acs/acs5";

    /// Vintage used when none is given on the command line
    pub const DEFAULT_YEAR: u16 = 2022;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Result artifact extension
    pub const ARTIFACT_EXTENSION: &str = "json";

    /// History log extension
    pub const HISTORY_EXTENSION: &str = "jsonl";
}

/// Cache layout and retention constants
pub mod cache {
    /// Default retention window for results and user history (days)
    pub const DEFAULT_RETENTION_DAYS: u32 = 30;

    /// Time-to-live for geography enumerations (days)
    pub const GEOGRAPHY_TTL_DAYS: u64 = 30;

    /// Result cache index file name
    pub const INDEX_FILE: &str = "index.json";

    /// Directory holding result artifacts and the index
    pub const RESULTS_DIR: &str = "results";

    /// Directory holding geography enumerations
    pub const GEOGRAPHY_DIR: &str = "geography";

    /// Directory holding per-user history logs
    pub const HISTORY_DIR: &str = "history";

    /// Application directory name under the OS cache dir
    pub const APP_DIR: &str = "census-geo";
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of concurrent query fetches
    pub const DEFAULT_MAX_CONCURRENT: usize = 5;

    /// Maximum recommended concurrent fetches
    pub const MAX_CONCURRENT: usize = 32;
}

/// Query planning limits
pub mod planner {
    /// Census API limit on variables per request
    pub const DEFAULT_MAX_VARIABLES: usize = 50;
}

// Re-export commonly used constants for convenience
pub use census::BASE_URL as CENSUS_BASE_URL;
pub use env::API_KEY as ENV_API_KEY;
pub use files::TEMP_FILE_SUFFIX;
pub use http::USER_AGENT;
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_RETRIES, RETRY_BASE_DELAY_MS};
pub use workers::DEFAULT_MAX_CONCURRENT;
