//! Data models for geography constraints and enumerated areas
//!
//! Geography levels are a closed set: every level the engine understands has
//! a single canonical API token and a granularity rank. Free-form tokens are
//! parsed through the synonym table once, at construction, so an invalid
//! level is an error up front rather than a silent no-op downstream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::hierarchy::normalize_token;
use crate::constants::census;
use crate::errors::{GeoError, GeoResult};

/// Tabular API payload: header row followed by data rows
pub type TableRows = Vec<Vec<String>>;

/// Token used by the API for metropolitan/micropolitan statistical areas
pub const METRO_AREA_TOKEN: &str = "metropolitan statistical area/micropolitan statistical area";

/// A geography level recognised by the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Us,
    Region,
    Division,
    State,
    CombinedStatisticalArea,
    MetroArea,
    MetroDivision,
    StateOrPart,
    County,
    CongressionalDistrict,
    CountySubdivision,
    Place,
    PrincipalCity,
    SchoolDistrictUnified,
    Zcta,
    Tract,
    BlockGroup,
}

impl Level {
    /// Every level, in declaration order
    pub const ALL: [Level; 17] = [
        Level::Us,
        Level::Region,
        Level::Division,
        Level::State,
        Level::CombinedStatisticalArea,
        Level::MetroArea,
        Level::MetroDivision,
        Level::StateOrPart,
        Level::County,
        Level::CongressionalDistrict,
        Level::CountySubdivision,
        Level::Place,
        Level::PrincipalCity,
        Level::SchoolDistrictUnified,
        Level::Zcta,
        Level::Tract,
        Level::BlockGroup,
    ];

    /// Canonical API token for this level
    pub fn token(&self) -> &'static str {
        match self {
            Level::Us => "us",
            Level::Region => "region",
            Level::Division => "division",
            Level::State => "state",
            Level::CombinedStatisticalArea => "combined statistical area",
            Level::MetroArea => METRO_AREA_TOKEN,
            Level::MetroDivision => "metropolitan division",
            Level::StateOrPart => "state (or part)",
            Level::County => "county",
            Level::CongressionalDistrict => "congressional district",
            Level::CountySubdivision => "county subdivision",
            Level::Place => "place",
            Level::PrincipalCity => "principal city (or part)",
            Level::SchoolDistrictUnified => "school district (unified)",
            Level::Zcta => "zip code tabulation area",
            Level::Tract => "tract",
            Level::BlockGroup => "block group",
        }
    }

    /// Granularity rank; higher is finer
    pub fn granularity(&self) -> u8 {
        match self {
            Level::Us => 0,
            Level::Region => 1,
            Level::Division => 2,
            Level::State => 3,
            Level::CombinedStatisticalArea => 4,
            Level::MetroArea => 5,
            Level::MetroDivision => 6,
            Level::StateOrPart => 7,
            Level::County | Level::CongressionalDistrict => 8,
            Level::CountySubdivision
            | Level::Place
            | Level::PrincipalCity
            | Level::SchoolDistrictUnified => 9,
            Level::Zcta => 10,
            Level::Tract => 11,
            Level::BlockGroup => 12,
        }
    }

    /// Parse a token or synonym into a level
    pub fn parse(token: &str) -> GeoResult<Self> {
        let canonical = normalize_token(token);
        Level::ALL
            .iter()
            .copied()
            .find(|level| level.token() == canonical)
            .ok_or_else(|| GeoError::UnknownLevel {
                token: token.to_string(),
            })
    }

    /// Filesystem and label friendly form of the token
    pub fn slug(&self) -> String {
        slugify(self.token())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Level {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::parse(s)
    }
}

impl Serialize for Level {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        Level::parse(&token).map_err(serde::de::Error::custom)
    }
}

/// Replace every run of non-alphanumeric characters with a single dash
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// One `(level, value)` constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoPair {
    pub level: Level,
    pub value: String,
}

impl GeoPair {
    pub fn new(level: Level, value: impl Into<String>) -> Self {
        Self {
            level,
            value: value.into().trim().to_string(),
        }
    }

    /// Parse a raw `(token, value)` pair
    pub fn parse(token: &str, value: &str) -> GeoResult<Self> {
        Ok(Self::new(Level::parse(token)?, value))
    }

    /// Whether the value is already an API code (digits, a comma list of digits, or `*`)
    pub fn has_code_value(&self) -> bool {
        is_code_value(&self.value)
    }

    /// Render as an API clause, `token:value`
    pub fn clause(&self) -> String {
        format!("{}:{}", self.level.token(), self.value)
    }
}

impl fmt::Display for GeoPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.clause())
    }
}

/// Whether a constraint value is a code rather than a free-text name
pub fn is_code_value(value: &str) -> bool {
    let value = value.trim();
    if value == census::WILDCARD {
        return true;
    }
    !value.is_empty()
        && value
            .split(',')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// A resolved geography: one `for` target plus ordered `in` ancestors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoConstraint {
    pub target: GeoPair,
    pub ancestors: Vec<GeoPair>,
}

impl GeoConstraint {
    pub fn new(target: GeoPair, ancestors: Vec<GeoPair>) -> Self {
        Self { target, ancestors }
    }

    /// Target without ancestors
    pub fn target_only(target: GeoPair) -> Self {
        Self::new(target, Vec::new())
    }

    /// Target level
    pub fn level(&self) -> Level {
        self.target.level
    }

    /// The `for=` clause
    pub fn for_clause(&self) -> String {
        self.target.clause()
    }

    /// The `in=` clause, space separated, if any ancestors exist
    pub fn in_clause(&self) -> Option<String> {
        if self.ancestors.is_empty() {
            return None;
        }
        Some(
            self.ancestors
                .iter()
                .map(GeoPair::clause)
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    /// Query parameters for the geography part of a request
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("for", self.for_clause())];
        if let Some(in_clause) = self.in_clause() {
            params.push(("in", in_clause));
        }
        params
    }

    /// Order-independent form used when hashing signatures
    pub fn normalized(&self) -> (String, Vec<String>) {
        let mut ancestors: Vec<String> = self.ancestors.iter().map(GeoPair::clause).collect();
        ancestors.sort();
        ancestors.dedup();
        (self.target.clause(), ancestors)
    }

    /// Value of the ancestor at `level`, if present
    pub fn ancestor_value(&self, level: Level) -> Option<&str> {
        self.ancestors
            .iter()
            .find(|pair| pair.level == level)
            .map(|pair| pair.value.as_str())
    }
}

impl fmt::Display for GeoConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "for={}", self.for_clause())?;
        if let Some(in_clause) = self.in_clause() {
            write!(f, " in={}", in_clause)?;
        }
        Ok(())
    }
}

/// One named area at a specific level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRecord {
    /// The level's own code, e.g. county `037`
    pub code: String,
    /// Composite identifier, e.g. `0500000US06037`
    pub composite_id: String,
    /// Full display name, e.g. `Los Angeles County, California`
    pub full_name: String,
}
