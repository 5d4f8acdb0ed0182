//! Fuzzy matching of free-text area names
//!
//! Names are normalized (case, punctuation, administrative suffixes) and
//! compared in three tiers. The first tier with any match wins; inside a
//! tier the shortest candidate wins, ties broken alphabetically.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::app::models::AreaRecord;

/// Administrative suffixes ignored when comparing names, longest first
const ADMIN_SUFFIXES: &[&[&str]] = &[
    &["city", "and", "borough"],
    &["census", "area"],
    &["municipality"],
    &["municipio"],
    &["township"],
    &["borough"],
    &["parish"],
    &["county"],
    &["village"],
    &["city"],
    &["town"],
    &["cdp"],
];

/// How a candidate matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum MatchTier {
    /// Normalized names are equal
    Exact,
    /// The search term occurs inside the candidate
    CandidateContainsQuery,
    /// The candidate occurs inside the search term
    QueryContainsCandidate,
}

impl MatchTier {
    pub fn confidence(&self) -> f64 {
        match self {
            MatchTier::Exact => 1.0,
            MatchTier::CandidateContainsQuery => 0.9,
            MatchTier::QueryContainsCandidate => 0.8,
        }
    }
}

/// Result of a successful name lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaMatch {
    pub record: AreaRecord,
    pub tier: MatchTier,
    pub confidence: f64,
}

/// Lower-case, drop punctuation and trailing administrative suffixes
///
/// Comma separated parts are normalized independently and joined with a
/// single space. A suffix is only stripped when words remain before it.
pub fn normalize_area_name(name: &str) -> String {
    name.split(',')
        .map(normalize_part)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_part(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .filter(|c| !matches!(c, '\'' | '.' | '\u{2019}'))
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    loop {
        let stripped = ADMIN_SUFFIXES.iter().find(|suffix| {
            words.len() > suffix.len() && words[words.len() - suffix.len()..] == suffix[..]
        });
        match stripped {
            Some(suffix) => words.truncate(words.len() - suffix.len()),
            None => break,
        }
    }
    words.join(" ")
}

/// Text before the first comma
fn primary_name(full_name: &str) -> &str {
    full_name.split(',').next().unwrap_or(full_name)
}

/// Find the best candidate for `query` among enumerated areas
pub fn match_area(query: &str, areas: &BTreeMap<String, AreaRecord>) -> Option<AreaMatch> {
    let needle = normalize_area_name(query);
    if needle.is_empty() {
        return None;
    }
    let qualified = query.contains(',');

    let candidates: Vec<(String, &AreaRecord)> = areas
        .values()
        .map(|record| {
            let compared = if qualified {
                record.full_name.as_str()
            } else {
                primary_name(&record.full_name)
            };
            (normalize_area_name(compared), record)
        })
        .filter(|(key, _)| !key.is_empty())
        .collect();

    let tiers = [
        MatchTier::Exact,
        MatchTier::CandidateContainsQuery,
        MatchTier::QueryContainsCandidate,
    ];
    tiers.into_iter().find_map(|tier| {
        candidates
            .iter()
            .filter(|(key, _)| match tier {
                MatchTier::Exact => *key == needle,
                MatchTier::CandidateContainsQuery => key.contains(&needle),
                MatchTier::QueryContainsCandidate => needle.contains(key.as_str()),
            })
            .min_by(|(a_key, a), (b_key, b)| {
                a_key
                    .len()
                    .cmp(&b_key.len())
                    .then_with(|| a.full_name.cmp(&b.full_name))
            })
            .map(|(_, record)| AreaMatch {
                record: (*record).clone(),
                tier,
                confidence: tier.confidence(),
            })
    })
}
