//! Integration tests for the on-disk result cache
//!
//! Exercise signatures, persistence across reopen, retention and history
//! through the public API only; entries are aged by rewriting the index.

mod common;

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use census_geo::app::cache::{CacheConfig, CacheIndex, HistoryLog, ResultCache};
use census_geo::app::hash::QuerySignature;
use census_geo::app::models::{GeoConstraint, GeoPair, Level, TableRows};
use census_geo::app::planner::{build_query_specs, OverflowPolicy};
use census_geo::constants::cache as layout;

fn los_angeles() -> GeoConstraint {
    GeoConstraint::new(
        GeoPair::new(Level::County, "037"),
        vec![GeoPair::new(Level::State, "06")],
    )
}

fn vars(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn table(value: &str) -> TableRows {
    vec![
        vec!["NAME".to_string(), "B01003_001E".to_string()],
        vec!["Los Angeles County, California".to_string(), value.to_string()],
    ]
}

/// Move every listed entry's last access `days` into the past
async fn age_entries(root: &std::path::Path, signatures: &[QuerySignature], days: i64) {
    let path = root.join(layout::RESULTS_DIR).join(layout::INDEX_FILE);
    let content = tokio::fs::read(&path).await.unwrap();
    let mut index: CacheIndex = serde_json::from_slice(&content).unwrap();
    for signature in signatures {
        let entry = index.entries.get_mut(signature).unwrap();
        entry.last_accessed_at = Utc::now() - Duration::days(days);
    }
    tokio::fs::write(&path, serde_json::to_vec(&index).unwrap())
        .await
        .unwrap();
}

#[test]
fn test_signature_ignores_variable_and_ancestor_order() {
    let geo = los_angeles();
    let reordered = GeoConstraint::new(
        geo.target.clone(),
        geo.ancestors.iter().rev().cloned().collect(),
    );
    let fields = vars(&["NAME", "B01003_001E"]);

    let a = ResultCache::compute_signature(2022, "acs/acs5", &vars(&["B01003_001E", "NAME"]), &geo);
    let b = ResultCache::compute_signature(2022, "acs/acs5", &fields, &reordered);
    assert_eq!(a, b);

    // Each component still matters
    let state = GeoConstraint::target_only(GeoPair::new(Level::State, "06"));
    assert_ne!(a, ResultCache::compute_signature(2021, "acs/acs5", &fields, &geo));
    assert_ne!(a, ResultCache::compute_signature(2022, "acs/acs1", &fields, &geo));
    assert_ne!(a, ResultCache::compute_signature(2022, "acs/acs5", &vars(&["NAME"]), &geo));
    assert_ne!(a, ResultCache::compute_signature(2022, "acs/acs5", &fields, &state));
}

#[tokio::test]
async fn test_specs_built_in_different_order_share_a_cache_entry() {
    let dir = TempDir::new().unwrap();
    let cache = common::result_cache(&dir).await;
    let geo = los_angeles();

    let first = build_query_specs(
        &[2022],
        &geo,
        "acs/acs5",
        &vars(&["B19013_001E", "B01003_001E"]),
        50,
        OverflowPolicy::Truncate,
    )
    .unwrap();
    let second = build_query_specs(
        &[2022],
        &geo,
        "acs/acs5",
        &vars(&["B01003_001E", "B19013_001E"]),
        50,
        OverflowPolicy::Truncate,
    )
    .unwrap();
    assert_eq!(first[0].cache_key, second[0].cache_key);

    cache
        .store(first[0].cache_key, table("9663345"), BTreeMap::new())
        .await
        .unwrap();
    let hit = cache.lookup(second[0].cache_key).await.unwrap().unwrap();
    assert_eq!(hit.rows, table("9663345"));
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let signature =
        ResultCache::compute_signature(2022, "acs/acs5", &vars(&["NAME"]), &los_angeles());

    {
        let cache = common::result_cache(&dir).await;
        cache.store(signature, table("1"), BTreeMap::new()).await.unwrap();
    }

    let reopened = ResultCache::new(CacheConfig::with_cache_root(dir.path().to_path_buf()))
        .await
        .unwrap();
    assert!(reopened.contains(signature).await);
    let hit = reopened.lookup(signature).await.unwrap().unwrap();
    assert_eq!(hit.rows, table("1"));
    assert_eq!(reopened.stats().await.entry_count, 1);
}

#[tokio::test]
async fn test_deleted_artifact_is_a_miss_and_the_entry_is_dropped() {
    let dir = TempDir::new().unwrap();
    let cache = common::result_cache(&dir).await;
    let signature =
        ResultCache::compute_signature(2020, "acs/acs5", &vars(&["NAME"]), &los_angeles());

    let entry = cache.store(signature, table("1"), BTreeMap::new()).await.unwrap();
    let artifact = dir.path().join(layout::RESULTS_DIR).join(&entry.artifact_path);
    tokio::fs::remove_file(&artifact).await.unwrap();

    assert!(cache.lookup(signature).await.unwrap().is_none());
    assert!(!cache.contains(signature).await);
}

#[tokio::test]
async fn test_prune_by_age_keeps_recent_entries() {
    let dir = TempDir::new().unwrap();
    let geo = los_angeles();
    let old = ResultCache::compute_signature(2015, "acs/acs5", &vars(&["NAME"]), &geo);
    let recent = ResultCache::compute_signature(2022, "acs/acs5", &vars(&["NAME"]), &geo);

    {
        let cache = common::result_cache(&dir).await;
        cache.store(old, table("old"), BTreeMap::new()).await.unwrap();
        cache.store(recent, table("new"), BTreeMap::new()).await.unwrap();
    }
    age_entries(dir.path(), &[old], 45).await;
    age_entries(dir.path(), &[recent], 5).await;

    let cache = common::result_cache(&dir).await;
    let report = cache.prune_by_age(30).await;

    assert_eq!(report.examined, 2);
    assert_eq!(report.evicted, vec![old]);
    assert!(report.failures.is_empty());
    assert!(cache.lookup(old).await.unwrap().is_none());
    assert!(cache.lookup(recent).await.unwrap().is_some());
}

#[tokio::test]
async fn test_history_is_pruned_with_the_same_window() {
    let dir = TempDir::new().unwrap();
    let history = HistoryLog::new(dir.path().join(layout::HISTORY_DIR))
        .await
        .unwrap();

    let mut stale = history
        .append("alice", "median income in Orange County", None)
        .await
        .unwrap();
    stale.timestamp = Utc::now() - Duration::days(40);
    stale.query = "population of Los Angeles".to_string();
    history.append_record(&stale).await.unwrap();
    history.append("bob", "tracts in Yolo", None).await.unwrap();

    let report = history.prune_by_age(30).await;
    assert_eq!(report.records_removed, 1);
    assert!(report.failures.is_empty());

    let alice = history.read("alice").await.unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].query, "median income in Orange County");
    assert_eq!(history.read("bob").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_aborted_callers_leave_the_disk_consistent_with_the_index() {
    let dir = TempDir::new().unwrap();
    let cache = common::result_cache(&dir).await;

    let mut handles = Vec::new();
    for year in 1900..2000u16 {
        let cache = cache.clone();
        let signature =
            ResultCache::compute_signature(year, "acs/acs5", &vars(&["NAME"]), &los_angeles());
        handles.push(tokio::spawn(async move {
            cache
                .store_detached(signature, table(&year.to_string()), BTreeMap::new())
                .await
        }));
    }
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }
    // Let the detached writes finish
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let results = dir.path().join(layout::RESULTS_DIR);
    let mut artifacts = 0;
    let mut temps = 0;
    for entry in std::fs::read_dir(&results).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        if name.ends_with(".tmp") {
            temps += 1;
        } else if name != layout::INDEX_FILE {
            artifacts += 1;
        }
    }
    assert_eq!(temps, 0);
    assert_eq!(artifacts, cache.entries().await.len());
    assert_eq!(cache.enforce_size_limits().await.untracked_removed, 0);
}
