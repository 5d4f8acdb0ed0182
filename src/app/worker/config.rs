//! Executor configuration
//!
//! Concurrency, per-fetch timeout and the retry policy applied to every
//! data request the executor issues.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::client::RetryPolicy;
use crate::constants::{http, workers};
use crate::errors::ConfigError;

/// Configuration for the query executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Queries fetched at the same time
    pub max_concurrent: usize,
    /// Upper bound on a single fetch attempt
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Backoff for transient fetch failures
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: workers::DEFAULT_MAX_CONCURRENT,
            fetch_timeout: http::DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ExecutorConfig {
    /// Set the concurrency bound
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent".to_string(),
                value: "0".to_string(),
                reason: "Concurrency cannot be zero".to_string(),
            });
        }

        if self.max_concurrent > workers::MAX_CONCURRENT {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent".to_string(),
                value: self.max_concurrent.to_string(),
                reason: format!("Exceeds maximum ({})", workers::MAX_CONCURRENT),
            });
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout".to_string(),
                value: "0s".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::InvalidValue {
                field: "retry.base_delay".to_string(),
                value: format!("{:?}", self.retry.base_delay),
                reason: "Retry base delay must not exceed max delay".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::InvalidValue {
                field: "retry.jitter_factor".to_string(),
                value: self.retry.jitter_factor.to_string(),
                reason: "Jitter must be between 0.0 and 1.0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(ExecutorConfig::default()
            .with_max_concurrent(0)
            .validate()
            .is_err());
        assert!(ExecutorConfig::default()
            .with_max_concurrent(workers::MAX_CONCURRENT + 1)
            .validate()
            .is_err());
        assert!(ExecutorConfig::default()
            .with_fetch_timeout(Duration::ZERO)
            .validate()
            .is_err());

        let mut config = ExecutorConfig::default();
        config.retry.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_deserialize_from_humantime() {
        let config: ExecutorConfig = toml::from_str(
            r#"
            max_concurrent = 8
            fetch_timeout = "45s"

            [retry]
            max_retries = 2
            base_delay = "250ms"
            max_delay = "10s"
            jitter_factor = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.fetch_timeout, Duration::from_secs(45));
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
    }
}
