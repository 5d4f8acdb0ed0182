//! Geography token synonyms
//!
//! Callers (and upstream language models) refer to the same level in many
//! ways. Everything is folded onto the API's canonical token here so later
//! comparisons are plain string equality.

use crate::app::models::METRO_AREA_TOKEN;

/// Synonym -> canonical token
const SYNONYMS: &[(&str, &str)] = &[
    ("nation", "us"),
    ("national", "us"),
    ("united states", "us"),
    ("usa", "us"),
    ("regions", "region"),
    ("divisions", "division"),
    ("states", "state"),
    ("counties", "county"),
    ("cbsa", METRO_AREA_TOKEN),
    ("msa", METRO_AREA_TOKEN),
    ("metro", METRO_AREA_TOKEN),
    ("metro area", METRO_AREA_TOKEN),
    ("metropolitan statistical area", METRO_AREA_TOKEN),
    ("micropolitan statistical area", METRO_AREA_TOKEN),
    ("metdiv", "metropolitan division"),
    ("metro division", "metropolitan division"),
    ("csa", "combined statistical area"),
    ("zcta", "zip code tabulation area"),
    ("zip", "zip code tabulation area"),
    ("zip code", "zip code tabulation area"),
    ("zipcode", "zip code tabulation area"),
    ("cd", "congressional district"),
    ("congressional districts", "congressional district"),
    ("bg", "block group"),
    ("blockgroup", "block group"),
    ("block groups", "block group"),
    ("cousub", "county subdivision"),
    ("county subdivisions", "county subdivision"),
    ("tracts", "tract"),
    ("census tract", "tract"),
    ("places", "place"),
    ("school district", "school district (unified)"),
    ("unified school district", "school district (unified)"),
    ("state or part", "state (or part)"),
    ("principal city", "principal city (or part)"),
];

/// Fold a geography token onto its canonical API spelling
///
/// Lower-cases and collapses whitespace before consulting the synonym table.
/// Tokens with no synonym are returned in that normalized form.
pub fn normalize_token(token: &str) -> String {
    let collapsed = token
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == collapsed)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(collapsed)
}
