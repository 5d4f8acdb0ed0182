//! HTTP client for the Census data API
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Rate-limited requests and table parsing
//! - `retry`: Backoff policy shared by every remote call
//!
//! [`CensusClient`] is the live implementation of both
//! [`AreaFetcher`] and [`DataFetcher`].

use std::env;

use async_trait::async_trait;
use url::Url;

use crate::app::geography::{AreaFetcher, EnumerationRequest};
use crate::app::models::{GeoConstraint, TableRows};
use crate::app::planner::QuerySpec;
use crate::app::worker::DataFetcher;
use crate::constants::env as env_constants;
use crate::errors::{FetchError, FetchResult};

// Module declarations
pub mod config;
pub mod http;
pub mod retry;

pub use config::ClientConfig;
pub use retry::RetryPolicy;

use http::HttpHandler;

/// Build `{base}/{year}/{dataset}?get=...&for=...[&in=...][&key=...]`
pub fn build_query_url(
    base_url: &str,
    year: u16,
    dataset: &str,
    fields: &[String],
    geo: &GeoConstraint,
    api_key: Option<&str>,
) -> FetchResult<Url> {
    let raw = format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        year,
        dataset.trim_matches('/')
    );
    let mut url = Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.clone(),
        error: e.to_string(),
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("get", &fields.join(","));
        for (name, value) in geo.query_params() {
            query.append_pair(name, &value);
        }
        if let Some(key) = api_key.filter(|key| !key.is_empty()) {
            query.append_pair("key", key);
        }
    }
    Ok(url)
}

/// Client for the Census data API
///
/// Every request goes through a shared rate limiter. The API key is
/// optional; without one the API applies its anonymous quota.
#[derive(Debug)]
pub struct CensusClient {
    http_handler: HttpHandler,
    base_url: String,
    api_key: Option<String>,
}

impl CensusClient {
    /// Creates a client with default configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if HTTP client creation fails
    pub fn new() -> FetchResult<Self> {
        Self::new_with_config(ClientConfig::default())
    }

    /// Creates a client with custom configuration
    ///
    /// The API key is read from `CENSUS_API_KEY` when set.
    pub fn new_with_config(config: ClientConfig) -> FetchResult<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps)?;
        let api_key = env::var(env_constants::API_KEY)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            tracing::info!(
                "{} not set; using anonymous API access",
                env_constants::API_KEY
            );
        }

        Ok(Self {
            http_handler,
            base_url: config.base_url,
            api_key,
        })
    }

    /// Override the API key
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Fetch any table URL
    pub async fn fetch_table(&self, url: &Url) -> FetchResult<TableRows> {
        self.http_handler.get_table(url).await
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl AreaFetcher for CensusClient {
    async fn fetch_areas(&self, request: &EnumerationRequest) -> FetchResult<TableRows> {
        let url = request.to_url(&self.base_url, self.api_key.as_deref())?;
        self.fetch_table(&url).await
    }
}

#[async_trait]
impl DataFetcher for CensusClient {
    async fn fetch(&self, spec: &QuerySpec) -> FetchResult<TableRows> {
        let url = spec.to_url(&self.base_url, self.api_key.as_deref())?;
        self.fetch_table(&url).await
    }
}
