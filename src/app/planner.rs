//! Query planning
//!
//! Turns a resolved geography, a dataset and the chosen measure variables
//! into one [`QuerySpec`] per requested year. Every spec asks for the
//! display name field first, carries a readable label for tracing and the
//! signature it is cached under.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::app::client::build_query_url;
use crate::app::hash::QuerySignature;
use crate::app::models::GeoConstraint;
use crate::constants::{census, planner};
use crate::errors::{ConfigError, FetchResult, QueryError, QueryResult};

/// What to do when a request would exceed the per-request variable limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Keep the first variables that fit and log the rest
    #[default]
    Truncate,
    /// Emit several specs per year, each under the limit
    Split,
    /// Fail planning with `QueryError::TooManyVariables`
    Reject,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Truncate => "truncate",
            OverflowPolicy::Split => "split",
            OverflowPolicy::Reject => "reject",
        })
    }
}

impl FromStr for OverflowPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(OverflowPolicy::Truncate),
            "split" => Ok(OverflowPolicy::Split),
            "reject" => Ok(OverflowPolicy::Reject),
            other => Err(ConfigError::InvalidValue {
                field: "overflow_policy".to_string(),
                value: other.to_string(),
                reason: "expected truncate, split or reject".to_string(),
            }),
        }
    }
}

/// Planner limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Variables per request, the name field included
    pub max_variables: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_variables: planner::DEFAULT_MAX_VARIABLES,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl PlannerConfig {
    pub fn with_max_variables(mut self, max_variables: usize) -> Self {
        self.max_variables = max_variables;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Limits below 2 cannot hold the name field plus a measure
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_variables < 2 {
            return Err(ConfigError::InvalidValue {
                field: "max_variables".to_string(),
                value: self.max_variables.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}

/// One concrete data request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySpec {
    pub year: u16,
    pub dataset: String,
    /// Requested fields, `NAME` first
    pub variables: Vec<String>,
    pub geo: GeoConstraint,
    /// `{variable}_{level}_{year}`, for tracing only
    pub label: String,
    /// Signature the result is cached under
    pub cache_key: QuerySignature,
}

impl QuerySpec {
    /// Remote data query URL
    pub fn to_url(&self, base_url: &str, api_key: Option<&str>) -> FetchResult<Url> {
        build_query_url(
            base_url,
            self.year,
            &self.dataset,
            &self.variables,
            &self.geo,
            api_key,
        )
    }

    /// Requested variables other than the name field
    pub fn measure_variables(&self) -> impl Iterator<Item = &str> {
        self.variables
            .iter()
            .map(String::as_str)
            .filter(|v| *v != census::NAME_FIELD)
    }
}

/// Build one spec per distinct year (ascending), more under the split policy
///
/// # Errors
///
/// `NoYears` and `NoVariables` for empty inputs; `VariableLimitTooSmall`
/// when `max_variables` is below 2; `TooManyVariables` when the reject
/// policy is in force and the list does not fit.
pub fn build_query_specs(
    years: &[u16],
    geo: &GeoConstraint,
    dataset: &str,
    measures: &[String],
    max_variables: usize,
    policy: OverflowPolicy,
) -> QueryResult<Vec<QuerySpec>> {
    let mut years = years.to_vec();
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        return Err(QueryError::NoYears);
    }

    let mut measure_list: Vec<String> = Vec::with_capacity(measures.len());
    for measure in measures {
        let measure = measure.trim();
        if measure.is_empty()
            || measure == census::NAME_FIELD
            || measure_list.iter().any(|m| m == measure)
        {
            continue;
        }
        measure_list.push(measure.to_string());
    }
    if measure_list.is_empty() {
        return Err(QueryError::NoVariables);
    }

    if max_variables < 2 {
        return Err(QueryError::VariableLimitTooSmall {
            limit: max_variables,
        });
    }
    // Room left after the name field
    let room = max_variables - 1;
    let requested = measure_list.len() + 1;
    let chunks: Vec<Vec<String>> = if measure_list.len() <= room {
        vec![measure_list]
    } else {
        match policy {
            OverflowPolicy::Truncate => {
                warn!(
                    "Truncating {} variables to the limit of {}; dropped: {}",
                    requested,
                    room + 1,
                    measure_list[room..].join(",")
                );
                measure_list.truncate(room);
                vec![measure_list]
            }
            OverflowPolicy::Split => measure_list.chunks(room).map(<[String]>::to_vec).collect(),
            OverflowPolicy::Reject => {
                return Err(QueryError::TooManyVariables {
                    requested,
                    limit: room + 1,
                });
            }
        }
    };

    let level = geo.level().slug();
    let mut specs = Vec::with_capacity(years.len() * chunks.len());
    for year in years {
        for (part, chunk) in chunks.iter().enumerate() {
            let mut variables = Vec::with_capacity(chunk.len() + 1);
            variables.push(census::NAME_FIELD.to_string());
            variables.extend(chunk.iter().cloned());

            let mut label = format!("{}_{}_{}", chunk[0], level, year);
            if chunks.len() > 1 {
                label.push_str(&format!("_part{}", part + 1));
            }

            let cache_key = QuerySignature::compute(year, dataset, &variables, geo);
            debug!("Planned {} -> {}", label, cache_key);
            specs.push(QuerySpec {
                year,
                dataset: dataset.to_string(),
                variables,
                geo: geo.clone(),
                label,
                cache_key,
            });
        }
    }
    Ok(specs)
}

/// Planner bound to a configuration
#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    config: PlannerConfig,
}

impl QueryPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// See [`build_query_specs`]
    pub fn plan(
        &self,
        years: &[u16],
        geo: &GeoConstraint,
        dataset: &str,
        measures: &[String],
    ) -> QueryResult<Vec<QuerySpec>> {
        build_query_specs(
            years,
            geo,
            dataset,
            measures,
            self.config.max_variables,
            self.config.overflow_policy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{GeoPair, Level};

    fn geo() -> GeoConstraint {
        GeoConstraint::new(
            GeoPair::new(Level::County, "*"),
            vec![GeoPair::new(Level::State, "06")],
        )
    }

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_one_spec_per_distinct_year_ascending() {
        let specs = build_query_specs(
            &[2022, 2019, 2022, 2020],
            &geo(),
            "acs/acs5",
            &vars(&["B01003_001E"]),
            50,
            OverflowPolicy::Truncate,
        )
        .unwrap();

        let years: Vec<u16> = specs.iter().map(|s| s.year).collect();
        assert_eq!(years, vec![2019, 2020, 2022]);
        assert_eq!(specs[0].variables, vars(&["NAME", "B01003_001E"]));
        assert_eq!(specs[0].label, "B01003_001E_county_2019");
        assert_ne!(specs[0].cache_key, specs[1].cache_key);
    }

    #[test]
    fn test_limit_without_room_for_a_measure_is_rejected() {
        for limit in [0, 1] {
            let err = build_query_specs(
                &[2022],
                &geo(),
                "acs/acs5",
                &vars(&["B01003_001E", "B19013_001E"]),
                limit,
                OverflowPolicy::Split,
            )
            .unwrap_err();
            assert!(matches!(err, QueryError::VariableLimitTooSmall { limit: l } if l == limit));
        }

        // Two is enough for one measure per request
        let specs = build_query_specs(
            &[2022],
            &geo(),
            "acs/acs5",
            &vars(&["B01003_001E", "B19013_001E"]),
            2,
            OverflowPolicy::Split,
        )
        .unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| s.variables.len() == 2));
    }

    #[test]
    fn test_name_field_not_duplicated() {
        let specs = build_query_specs(
            &[2022],
            &geo(),
            "acs/acs5",
            &vars(&["NAME", "B19013_001E", " B19013_001E "]),
            50,
            OverflowPolicy::Truncate,
        )
        .unwrap();
        assert_eq!(specs[0].variables, vars(&["NAME", "B19013_001E"]));
        assert_eq!(specs[0].measure_variables().collect::<Vec<_>>(), vec!["B19013_001E"]);
    }

    #[test]
    fn test_truncate_policy() {
        let specs = build_query_specs(
            &[2022],
            &geo(),
            "acs/acs5",
            &vars(&["A", "B", "C", "D"]),
            3,
            OverflowPolicy::Truncate,
        )
        .unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].variables, vars(&["NAME", "A", "B"]));
    }

    #[test]
    fn test_split_policy_keeps_name_in_every_part() {
        let specs = build_query_specs(
            &[2021, 2022],
            &geo(),
            "acs/acs5",
            &vars(&["A", "B", "C", "D", "E"]),
            3,
            OverflowPolicy::Split,
        )
        .unwrap();
        assert_eq!(specs.len(), 6);
        assert!(specs.iter().all(|s| s.variables[0] == "NAME" && s.variables.len() <= 3));
        assert_eq!(specs[2].variables, vars(&["NAME", "E"]));
        assert_eq!(specs[2].label, "E_county_2021_part3");
    }

    #[test]
    fn test_reject_policy() {
        let result = build_query_specs(
            &[2022],
            &geo(),
            "acs/acs5",
            &vars(&["A", "B", "C"]),
            3,
            OverflowPolicy::Reject,
        );
        assert!(matches!(
            result,
            Err(QueryError::TooManyVariables {
                requested: 4,
                limit: 3
            })
        ));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(matches!(
            build_query_specs(&[], &geo(), "acs/acs5", &vars(&["A"]), 50, OverflowPolicy::Truncate),
            Err(QueryError::NoYears)
        ));
        assert!(matches!(
            build_query_specs(&[2022], &geo(), "acs/acs5", &vars(&["NAME", " "]), 50, OverflowPolicy::Truncate),
            Err(QueryError::NoVariables)
        ));
    }

    #[test]
    fn test_overflow_policy_parsing() {
        assert_eq!("Split".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Split);
        assert!("drop".parse::<OverflowPolicy>().is_err());
        assert_eq!(OverflowPolicy::default().to_string(), "truncate");
    }

    #[test]
    fn test_planner_config_validation() {
        assert!(PlannerConfig::default().validate().is_ok());
        assert!(PlannerConfig::default().with_max_variables(1).validate().is_err());
    }

    #[test]
    fn test_spec_url() {
        let planner = QueryPlanner::default();
        let specs = planner
            .plan(&[2022], &geo(), "acs/acs5", &vars(&["B01003_001E"]))
            .unwrap();
        let url = specs[0].to_url(census::BASE_URL, None).unwrap();
        assert!(url.as_str().starts_with("https://api.census.gov/data/2022/acs/acs5?get=NAME%2CB01003_001E"));
    }
}
