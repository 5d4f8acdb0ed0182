//! Error types for census_geo
//!
//! This module defines the error types for every component of the engine.
//! Errors are split by concern so that per-query failures, geography
//! resolution problems and cache housekeeping issues can be contained at the
//! right level instead of aborting a whole batch.

use std::path::PathBuf;
use thiserror::Error;

/// Remote API and HTTP client errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Invalid URL produced for a request
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Server returned a 5xx status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Server rejected the request (4xx other than 429)
    #[error("Request rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Response body could not be interpreted as a table
    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// Maximum retries exceeded
    #[error("Maximum retry attempts ({max_retries}) exceeded: {last_error}")]
    MaxRetriesExceeded { max_retries: u32, last_error: String },

    /// Generic error for other issues
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Whether the failure is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. }
            | FetchError::ServerError { .. }
            | FetchError::RateLimitExceeded => true,
            FetchError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|status| {
                        status.is_server_error()
                            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            _ => false,
        }
    }
}

/// Geography resolution errors
#[derive(Error, Debug)]
pub enum GeoError {
    /// Token does not name a known geography level
    #[error("Unknown geography level: {token}")]
    UnknownLevel { token: String },

    /// No target level supplied
    #[error("No target geography supplied")]
    MissingTarget,

    /// The catalog could not enumerate a level and nothing is cached
    #[error("Geography catalog unavailable for {level} in {dataset} {year}")]
    CatalogUnavailable {
        dataset: String,
        year: u16,
        level: String,
    },

    /// A free-text area name did not match any enumerated area
    #[error("No {level} matching '{query}'")]
    AreaNotFound { level: String, query: String },

    /// Geography cache file could not be read or written
    #[error("Geography cache I/O error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },
}

/// Result cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Cache index corruption
    #[error("Cache index corrupted: {reason}")]
    IndexCorrupted { reason: String },

    /// Artifact write failed
    #[error("Failed to write cache artifact {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    /// Atomic rename failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Serialization of an artifact or the index failed
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O error
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Query planning and execution errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// No years were requested
    #[error("No years requested")]
    NoYears,

    /// No measure variables were supplied
    #[error("No measure variables supplied")]
    NoVariables,

    /// Variable list exceeds the per-request limit under the reject policy
    #[error("Query needs {requested} variables but the limit is {limit}")]
    TooManyVariables { requested: usize, limit: usize },

    /// Variable limit leaves no room for a measure beside the name field
    #[error("Variable limit {limit} is too small; at least 2 are needed")]
    VariableLimitTooSmall { limit: usize },

    /// Fetch failed for a single query
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Cache failed for a single query
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Execution was abandoned before this query completed
    #[error("Query cancelled before completion")]
    Cancelled,

    /// Worker task panicked or was aborted
    #[error("Query worker terminated unexpectedly: {reason}")]
    WorkerFailed { reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Fetch error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Geography error
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Query error
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient or asks for clarification)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Fetch(e) => e.is_transient(),
            AppError::Query(QueryError::Fetch(e)) => e.is_transient(),
            AppError::Geo(GeoError::AreaNotFound { .. })
            | AppError::Geo(GeoError::CatalogUnavailable { .. }) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Fetch(_) => "fetch",
            AppError::Geo(_) => "geography",
            AppError::Cache(_) => "cache",
            AppError::Query(_) => "query",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Geography result type alias
pub type GeoResult<T> = std::result::Result<T, GeoError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Query result type alias
pub type QueryResult<T> = std::result::Result<T, QueryError>;
