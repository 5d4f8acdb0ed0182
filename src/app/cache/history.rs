//! Per-user query history
//!
//! Each user gets a JSON-lines log under the history directory. The log is
//! pruned with the same age rule as the result cache, independently of it.
//! Pruning is best-effort housekeeping: failures are logged per user and
//! reported, never propagated.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::atomic::write_atomic;
use super::retention::{partition_by_age, retention_cutoff, Aged};
use crate::app::hash::QuerySignature;
use crate::constants::files;
use crate::errors::CacheResult;

/// One question a user asked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub signature: Option<QuerySignature>,
}

impl Aged for HistoryRecord {
    fn last_activity(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A log line as read back; unreadable lines are kept verbatim
#[derive(Debug)]
enum HistoryLine {
    Record(HistoryRecord),
    Unreadable(String),
}

impl Aged for HistoryLine {
    fn last_activity(&self) -> DateTime<Utc> {
        match self {
            HistoryLine::Record(record) => record.timestamp,
            // Never expires
            HistoryLine::Unreadable(_) => DateTime::<Utc>::MAX_UTC,
        }
    }
}

/// Outcome of pruning every user's history
#[derive(Debug, Clone, Default)]
pub struct HistoryPruneReport {
    pub users_examined: usize,
    pub records_removed: usize,
    pub failures: Vec<String>,
}

/// Append-only per-user history logs
#[derive(Debug)]
pub struct HistoryLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryLog {
    /// Open (and create) the history directory
    pub async fn new(dir: PathBuf) -> CacheResult<Self> {
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn user_file(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir
            .join(format!("{}.{}", safe, files::HISTORY_EXTENSION))
    }

    /// Record a query for `user_id`
    pub async fn append(
        &self,
        user_id: &str,
        query: &str,
        signature: Option<QuerySignature>,
    ) -> CacheResult<HistoryRecord> {
        let record = HistoryRecord {
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            signature,
        };
        self.append_record(&record).await?;
        Ok(record)
    }

    /// Append an already built record
    pub async fn append_record(&self, record: &HistoryRecord) -> CacheResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.user_file(&record.user_id))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Every readable record for `user_id`, oldest first
    pub async fn read(&self, user_id: &str) -> CacheResult<Vec<HistoryRecord>> {
        Self::read_file(&self.user_file(user_id)).await
    }

    async fn read_file(path: &Path) -> CacheResult<Vec<HistoryRecord>> {
        let records = Self::read_lines(path)
            .await?
            .into_iter()
            .filter_map(|line| match line {
                HistoryLine::Record(record) => Some(record),
                HistoryLine::Unreadable(_) => None,
            })
            .collect();
        Ok(records)
    }

    async fn read_lines(path: &Path) -> CacheResult<Vec<HistoryLine>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(record) => lines.push(HistoryLine::Record(record)),
                Err(e) => {
                    warn!(
                        "Skipping unreadable history line {} in {}: {}",
                        number + 1,
                        path.display(),
                        e
                    );
                    lines.push(HistoryLine::Unreadable(line.to_string()));
                }
            }
        }
        Ok(lines)
    }

    /// Drop records older than the retention window for every user
    pub async fn prune_by_age(&self, retention_days: u32) -> HistoryPruneReport {
        let cutoff = retention_cutoff(retention_days, Utc::now());
        let mut report = HistoryPruneReport::default();

        let _guard = self.write_lock.lock().await;
        let mut listing = match fs::read_dir(&self.dir).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Cannot list history directory {}: {}", self.dir.display(), e);
                report.failures.push(format!("{}: {}", self.dir.display(), e));
                return report;
            }
        };

        loop {
            let path = match listing.next_entry().await {
                Ok(Some(entry)) => entry.path(),
                Ok(None) => break,
                Err(e) => {
                    warn!("History directory listing failed: {}", e);
                    report.failures.push(e.to_string());
                    break;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some(files::HISTORY_EXTENSION) {
                continue;
            }

            report.users_examined += 1;
            match Self::prune_file(&path, cutoff).await {
                Ok(removed) => report.records_removed += removed,
                Err(e) => {
                    warn!("Failed to prune history {}: {}", path.display(), e);
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        if report.records_removed > 0 {
            info!(
                "Pruned {} history records across {} users",
                report.records_removed, report.users_examined
            );
        }
        report
    }

    async fn prune_file(path: &Path, cutoff: DateTime<Utc>) -> CacheResult<usize> {
        let lines = Self::read_lines(path).await?;
        let (surviving, evicted) = partition_by_age(lines, cutoff);
        if evicted.is_empty() {
            return Ok(0);
        }

        if surviving.is_empty() {
            fs::remove_file(path).await?;
            debug!("Removed empty history log {}", path.display());
        } else {
            let mut content = Vec::new();
            let mut unreadable = 0;
            for line in &surviving {
                match line {
                    HistoryLine::Record(record) => content.extend(serde_json::to_vec(record)?),
                    HistoryLine::Unreadable(raw) => {
                        unreadable += 1;
                        content.extend(raw.as_bytes());
                    }
                }
                content.push(b'\n');
            }
            if unreadable > 0 {
                warn!(
                    "Kept {} unreadable lines in {} while pruning",
                    unreadable,
                    path.display()
                );
            }
            write_atomic(path, &content).await?;
        }
        Ok(evicted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path().join("history")).await.unwrap();

        log.append("alice", "population of Ohio", None).await.unwrap();
        log.append("alice", "median income in LA", None).await.unwrap();
        log.append("bob", "counties in Texas", None).await.unwrap();

        let alice = log.read("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].query, "population of Ohio");
        assert!(log.read("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_uses_the_same_cutoff() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path().join("history")).await.unwrap();
        let now = Utc::now();

        for (user, age) in [("alice", 45), ("alice", 2), ("bob", 60)] {
            log.append_record(&HistoryRecord {
                timestamp: now - Duration::days(age),
                user_id: user.to_string(),
                query: format!("{} days ago", age),
                signature: None,
            })
            .await
            .unwrap();
        }

        let report = log.prune_by_age(30).await;
        assert_eq!(report.users_examined, 2);
        assert_eq!(report.records_removed, 2);
        assert!(report.failures.is_empty());

        let alice = log.read("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].query, "2 days ago");
        assert!(!log.user_file("bob").exists());
    }

    #[tokio::test]
    async fn test_prune_keeps_unreadable_lines() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path().join("history")).await.unwrap();
        let now = Utc::now();

        log.append_record(&HistoryRecord {
            timestamp: now - Duration::days(45),
            user_id: "alice".to_string(),
            query: "old".to_string(),
            signature: None,
        })
        .await
        .unwrap();
        let path = log.user_file("alice");
        let mut file = fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"timestamp\": \"not a date\"}\n").await.unwrap();
        drop(file);
        log.append("alice", "recent", None).await.unwrap();

        let report = log.prune_by_age(30).await;
        assert_eq!(report.records_removed, 1);
        assert!(report.failures.is_empty());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"timestamp\": \"not a date\"}");
        let alice = log.read("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].query, "recent");
    }

    #[tokio::test]
    async fn test_unsafe_user_ids_stay_inside_the_directory() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path().join("history")).await.unwrap();
        let path = log.user_file("../../etc/passwd");
        assert_eq!(path.parent(), Some(log.dir()));
    }
}
