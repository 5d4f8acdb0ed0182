//! Configuration management for census_geo
//!
//! This module provides TOML configuration with multi-location lookup and
//! zero-config defaults. Every section is optional; missing keys fall back
//! to the runtime defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::client::{ClientConfig, RetryPolicy};
use crate::app::planner::{OverflowPolicy, PlannerConfig};
use crate::app::worker::ExecutorConfig;
use crate::constants::{cache, census, http, limits, planner, workers};
use crate::errors::{AppError, ConfigError, Result};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Result cache and history retention settings
    pub cache: CacheConfigToml,
    /// Geography catalog and hierarchy settings
    pub geography: GeographyConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Query executor settings
    pub executor: ExecutorConfigToml,
    /// Query planner settings
    pub planner: PlannerConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Cache directory path
    pub cache_root: Option<PathBuf>,
    /// Days a result or history record is kept after its last use
    pub retention_days: u32,
    /// Maximum number of cached results (0 = unlimited)
    pub max_entries: usize,
    /// Maximum cache size in bytes (0 = unlimited)
    pub max_cache_size: u64,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            cache_root: None,
            retention_days: cache::DEFAULT_RETENTION_DAYS,
            max_entries: 0,
            max_cache_size: 0,
        }
    }
}

/// TOML-friendly geography configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographyConfigToml {
    /// Days an enumeration file stays fresh
    pub ttl_days: u64,
    /// JSON file with hierarchy orderings
    pub hierarchy_file: Option<PathBuf>,
    /// Include the built-in orderings alongside the file
    pub use_default_hierarchy: bool,
}

impl Default for GeographyConfigToml {
    fn default() -> Self {
        Self {
            ttl_days: cache::GEOGRAPHY_TTL_DAYS,
            hierarchy_file: None,
            use_default_hierarchy: true,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Census data API base URL
    pub base_url: String,
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum connections per host
    pub pool_max_per_host: usize,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            base_url: census::BASE_URL.to_string(),
            tcp_keepalive_secs: Some(30),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

/// TOML-friendly executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfigToml {
    /// Queries fetched at the same time
    pub max_concurrent: usize,
    /// Timeout for a single fetch attempt in seconds
    pub fetch_timeout_secs: u64,
    /// Maximum retry attempts per query
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub retry_base_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub retry_max_delay_ms: u64,
    /// Jitter applied to retry delays (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for ExecutorConfigToml {
    fn default() -> Self {
        Self {
            max_concurrent: workers::DEFAULT_MAX_CONCURRENT,
            fetch_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            max_retries: limits::MAX_RETRIES,
            retry_base_delay_ms: limits::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: limits::MAX_BACKOFF_MS,
            jitter_factor: limits::BACKOFF_JITTER_FACTOR,
        }
    }
}

/// TOML-friendly planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfigToml {
    /// Variables per request, `NAME` included
    pub max_variables: usize,
    /// What to do with measures past the limit
    pub overflow_policy: OverflowPolicy,
}

impl Default for PlannerConfigToml {
    fn default() -> Self {
        Self {
            max_variables: planner::DEFAULT_MAX_VARIABLES,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(
        &self,
    ) -> Result<(CacheConfig, ClientConfig, ExecutorConfig, PlannerConfig)> {
        let executor = self.executor.to_runtime_config();
        executor.validate()?;
        let planner = self.planner.to_runtime_config();
        planner.validate()?;

        Ok((
            self.cache.to_runtime_config(),
            self.client.to_runtime_config(),
            executor,
            planner,
        ))
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, or first one found in standard locations)
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path }.into());
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => Ok(Self::default()),
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from("./census-geo.toml")];
        if let Some(path) = Self::get_default_config_path() {
            search_paths.push(path);
        }
        #[cfg(unix)]
        search_paths.push(PathBuf::from("/etc/census-geo/config.toml"));

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }

        debug!("No config file found in standard locations");
        None
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(cache::APP_DIR).join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::generic(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::from)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Geography enumeration time-to-live
    pub fn geography_ttl(&self) -> Duration {
        Duration::from_secs(self.geography.ttl_days * 24 * 60 * 60)
    }

    /// Default configuration content with comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# census_geo configuration

[cache]
# cache_root = "/path/to/custom/cache"
retention_days = {}
max_entries = 0       # 0 = unlimited
max_cache_size = 0    # bytes, 0 = unlimited

[geography]
ttl_days = {}
# hierarchy_file = "/path/to/hierarchy.json"
use_default_hierarchy = true

[client]
base_url = "{}"
tcp_keepalive_secs = 30
tcp_nodelay = true
pool_idle_timeout_secs = {}
pool_max_per_host = {}
request_timeout_secs = {}
connect_timeout_secs = {}
rate_limit_rps = {}

[executor]
max_concurrent = {}
fetch_timeout_secs = {}
max_retries = {}
retry_base_delay_ms = {}
retry_max_delay_ms = {}
jitter_factor = {:.1}

[planner]
max_variables = {}
overflow_policy = "truncate"  # truncate, split, reject

[logging]
level = "warn"  # error, warn, info, debug, trace
"#,
            cache::DEFAULT_RETENTION_DAYS,
            cache::GEOGRAPHY_TTL_DAYS,
            census::BASE_URL,
            http::POOL_IDLE_TIMEOUT.as_secs(),
            http::POOL_MAX_PER_HOST,
            http::DEFAULT_TIMEOUT.as_secs(),
            http::CONNECT_TIMEOUT.as_secs(),
            limits::DEFAULT_RATE_LIMIT_RPS,
            workers::DEFAULT_MAX_CONCURRENT,
            http::DEFAULT_TIMEOUT.as_secs(),
            limits::MAX_RETRIES,
            limits::RETRY_BASE_DELAY_MS,
            limits::MAX_BACKOFF_MS,
            limits::BACKOFF_JITTER_FACTOR,
            planner::DEFAULT_MAX_VARIABLES,
        )
    }
}

impl CacheConfigToml {
    /// Convert to runtime CacheConfig
    pub fn to_runtime_config(&self) -> CacheConfig {
        CacheConfig {
            cache_root: self.cache_root.clone(),
            retention_days: self.retention_days,
            max_entries: self.max_entries,
            max_cache_size: self.max_cache_size,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
        }
        .with_base_url(self.base_url.clone())
    }
}

impl ExecutorConfigToml {
    /// Convert to runtime ExecutorConfig
    pub fn to_runtime_config(&self) -> ExecutorConfig {
        let retry = RetryPolicy::default()
            .with_max_retries(self.max_retries)
            .with_delays(
                Duration::from_millis(self.retry_base_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            )
            .with_jitter(self.jitter_factor);

        ExecutorConfig::default()
            .with_max_concurrent(self.max_concurrent)
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_retry(retry)
    }
}

impl PlannerConfigToml {
    /// Convert to runtime PlannerConfig
    pub fn to_runtime_config(&self) -> PlannerConfig {
        PlannerConfig::default()
            .with_max_variables(self.max_variables)
            .with_overflow_policy(self.overflow_policy)
    }
}
