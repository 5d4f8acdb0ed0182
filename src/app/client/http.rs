//! Core HTTP operations with rate limiting
//!
//! This module issues single GET requests against the data API under a
//! process-wide rate limit, maps HTTP statuses onto [`FetchError`] variants
//! and parses the API's tabular JSON payload. Retrying is left to
//! [`RetryPolicy`](super::retry::RetryPolicy).

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use crate::app::models::TableRows;
use crate::errors::{FetchError, FetchResult};

/// Longest error body kept in a `Rejected` error
const MAX_ERROR_BODY: usize = 512;

/// HTTP operations handler with rate limiting
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the rate limit is zero
    pub fn new(client: Client, rate_limit_rps: u32) -> FetchResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Builds the rate limiter with the specified rate limit
    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> FetchResult<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>> {
        let quota = Quota::per_second(
            NonZeroU32::new(rate_limit_rps)
                .ok_or_else(|| FetchError::Other("Rate limit must be non-zero".to_string()))?,
        );
        Ok(RateLimiter::direct(quota))
    }

    /// Fetch `url` and parse the body as a table
    ///
    /// 204 and empty bodies yield an empty table. 429 and 5xx map to
    /// transient errors; any other non-success status is a rejection.
    pub async fn get_table(&self, url: &Url) -> FetchResult<TableRows> {
        // Apply rate limiting with jitter to avoid thundering herd
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            tracing::debug!("No content for {}", redact(url));
            return Ok(Vec::new());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Rate limited by server (429)");
            return Err(FetchError::RateLimitExceeded);
        }
        if status.is_server_error() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            let mut body = body.trim().to_string();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(FetchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let rows = parse_table(&body)?;
        tracing::debug!("Fetched {} rows from {}", rows.len(), redact(url));
        Ok(rows)
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// URL for logging, with the API key removed
pub fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != "key")
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(pairs);
    }
    clean.to_string()
}

/// Parse the API's JSON array-of-arrays payload
///
/// Nulls become empty strings and numbers keep their JSON rendering, so every
/// row is a plain list of strings.
pub fn parse_table(body: &str) -> FetchResult<TableRows> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse {
        reason: format!("not JSON: {}", e),
    })?;
    let Value::Array(rows) = value else {
        return Err(FetchError::MalformedResponse {
            reason: "expected a JSON array".to_string(),
        });
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Array(cells) => Ok(cells.into_iter().map(cell_to_string).collect()),
            other => Err(FetchError::MalformedResponse {
                reason: format!("row {} is not an array: {}", i, other),
            }),
        })
        .collect()
}

fn cell_to_string(cell: Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}
