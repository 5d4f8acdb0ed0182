//! Integration tests for hierarchy resolution
//!
//! Orderings come either from the built-in defaults or from a hierarchy
//! file loaded from disk, as the CLI does with `--hierarchy`.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use census_geo::app::hierarchy::{
    normalize_token, HierarchyResolver, OrderingCache, StaticHierarchyStore,
};
use census_geo::app::models::{GeoPair, Level, METRO_AREA_TOKEN};
use census_geo::app::planner::{build_query_specs, OverflowPolicy};

fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter()
        .map(|(token, value)| (token.to_string(), value.to_string()))
        .collect()
}

async fn resolver_from_file(dir: &TempDir, json: &str) -> HierarchyResolver {
    let path = dir.path().join("hierarchy.json");
    tokio::fs::write(&path, json).await.unwrap();
    let store = StaticHierarchyStore::load_from_file(&path, false)
        .await
        .unwrap();
    HierarchyResolver::new(Arc::new(store), Arc::new(OrderingCache::new()))
}

#[tokio::test]
async fn test_metro_ancestors_are_reordered_canonically() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver_from_file(
        &dir,
        r#"[{
            "dataset": "acs/acs5",
            "year": 2022,
            "level": "county",
            "ordering": ["cbsa", "metropolitan division", "state (or part)"]
        }]"#,
    )
    .await;

    let resolution = resolver
        .resolve(
            "acs/acs5",
            2022,
            &pairs(&[("county", "*")]),
            &pairs(&[
                ("metropolitan division", "35614"),
                ("state (or part)", "36"),
                (METRO_AREA_TOKEN, "35620"),
            ]),
        )
        .unwrap();

    assert!(resolution.ordering_found);
    assert_eq!(
        resolution.constraint.ancestors,
        vec![
            GeoPair::new(Level::MetroArea, "35620"),
            GeoPair::new(Level::MetroDivision, "35614"),
            GeoPair::new(Level::StateOrPart, "36"),
        ]
    );
    assert_eq!(resolution.constraint.for_clause(), "county:*");
}

#[tokio::test]
async fn test_unknown_dataset_without_defaults_keeps_caller_order() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver_from_file(
        &dir,
        r#"[{"dataset": "acs/acs1", "level": "tract", "ordering": ["state", "county"]}]"#,
    )
    .await;

    let resolution = resolver
        .resolve(
            "dec/pl",
            2020,
            &pairs(&[("tract", "*")]),
            &pairs(&[("county", "037"), ("state", "06")]),
        )
        .unwrap();

    assert!(!resolution.ordering_found);
    assert!(!resolution.warnings.is_empty());
    assert_eq!(
        resolution.constraint.in_clause().as_deref(),
        Some("county:037 state:06")
    );
}

#[test]
fn test_defaults_order_block_groups() {
    let resolver = common::resolver();
    let resolution = resolver
        .resolve(
            "acs/acs5",
            2022,
            &pairs(&[("bg", "1"), ("tracts", "207100")]),
            &pairs(&[("county", "037"), ("state", "06")]),
        )
        .unwrap();

    assert_eq!(resolution.constraint.for_clause(), "block group:1");
    assert_eq!(
        resolution.constraint.in_clause().as_deref(),
        Some("state:06 county:037 tract:207100")
    );
}

#[test]
fn test_synonyms_resolve_to_canonical_tokens() {
    assert_eq!(normalize_token("MSA"), METRO_AREA_TOKEN);
    assert_eq!(normalize_token("  Nation "), "us");
    assert_eq!(normalize_token("zip code"), "zip code tabulation area");
    assert_eq!(Level::parse("Counties").unwrap(), Level::County);
}

#[test]
fn test_resolved_constraint_builds_a_valid_url() {
    let resolution = common::resolver()
        .resolve(
            "acs/acs5",
            2022,
            &pairs(&[("tract", "*")]),
            &pairs(&[("county", "037"), ("state", "06")]),
        )
        .unwrap();

    let specs = build_query_specs(
        &[2022],
        &resolution.constraint,
        "acs/acs5",
        &["B01003_001E".to_string()],
        50,
        OverflowPolicy::Truncate,
    )
    .unwrap();
    let url = specs[0]
        .to_url("https://api.census.gov/data", Some("secret"))
        .unwrap();

    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(url.path(), "/data/2022/acs/acs5");
    assert!(query.contains(&("get".to_string(), "NAME,B01003_001E".to_string())));
    assert!(query.contains(&("for".to_string(), "tract:*".to_string())));
    assert!(query.contains(&("in".to_string(), "state:06 county:037".to_string())));
    assert!(query.contains(&("key".to_string(), "secret".to_string())));
}
