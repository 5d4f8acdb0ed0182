//! Executor result types
//!
//! Outcomes are reported per spec and keyed by the spec's own signature and
//! label; they arrive in completion order, not request order.

use std::time::Duration;

use serde::Serialize;

use crate::app::hash::QuerySignature;
use crate::app::models::TableRows;
use crate::errors::QueryError;

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultSource {
    /// Served from the result cache
    CacheHit,
    /// Fetched from the remote API (and stored)
    Fetched,
}

/// Rows for one spec
#[derive(Debug, Clone, Serialize)]
pub struct QueryData {
    pub rows: TableRows,
    pub source: ResultSource,
}

/// Outcome of one spec
#[derive(Debug)]
pub struct QueryOutcome {
    pub label: String,
    pub year: u16,
    pub signature: QuerySignature,
    pub result: Result<QueryData, QueryError>,
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Every outcome of a batch, successes and failures together
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<QueryOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&QueryOutcome, &QueryData)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|data| (o, data)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&QueryOutcome, &QueryError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o, e)))
    }

    /// Successes served from the cache
    pub fn cache_hits(&self) -> usize {
        self.successes()
            .filter(|(_, data)| data.source == ResultSource::CacheHit)
            .count()
    }

    /// Successes fetched remotely
    pub fn fetched(&self) -> usize {
        self.successes()
            .filter(|(_, data)| data.source == ResultSource::Fetched)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Outcome for a signature
    pub fn get(&self, signature: QuerySignature) -> Option<&QueryOutcome> {
        self.outcomes.iter().find(|o| o.signature == signature)
    }

    /// Outcome for a label
    pub fn by_label(&self, label: &str) -> Option<&QueryOutcome> {
        self.outcomes.iter().find(|o| o.label == label)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(QueryOutcome::is_success)
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} queries: {} cached, {} fetched, {} failed in {:.2}s",
            self.len(),
            self.cache_hits(),
            self.fetched(),
            self.failed(),
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(byte: u8, result: Result<QueryData, QueryError>) -> QueryOutcome {
        QueryOutcome {
            label: format!("label{}", byte),
            year: 2020 + byte as u16,
            signature: QuerySignature::from_bytes([byte; 16]),
            result,
        }
    }

    #[test]
    fn test_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                outcome(
                    1,
                    Ok(QueryData {
                        rows: vec![],
                        source: ResultSource::CacheHit,
                    }),
                ),
                outcome(
                    2,
                    Ok(QueryData {
                        rows: vec![],
                        source: ResultSource::Fetched,
                    }),
                ),
                outcome(3, Err(QueryError::Cancelled)),
            ],
            elapsed: Duration::from_millis(1500),
        };

        assert_eq!(report.len(), 3);
        assert_eq!(report.cache_hits(), 1);
        assert_eq!(report.fetched(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_succeeded());
        assert_eq!(report.by_label("label2").unwrap().year, 2022);
        assert!(report.get(QuerySignature::from_bytes([3; 16])).is_some());
        assert_eq!(
            report.summary(),
            "3 queries: 1 cached, 1 fetched, 1 failed in 1.50s"
        );
    }
}
