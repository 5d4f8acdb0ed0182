//! Command-line argument parsing for census_geo
//!
//! This module defines the CLI structure using clap derive macros:
//! hierarchy resolution, area enumeration and lookup, cached data fetches
//! and cache maintenance.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::planner::OverflowPolicy;
use crate::constants::census;

/// census_geo - Resolve Census geographies and cache query results
#[derive(Parser, Debug)]
#[command(
    name = "census_geo",
    version,
    about = "Resolve US Census geographies and cache data API queries",
    long_about = "Turns loosely specified geography (area names, levels, parents) into valid
Census data API parameters, plans per-year requests and serves repeated queries
from a local content-addressed cache."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// JSON file with hierarchy orderings
    #[arg(long, global = true, value_name = "FILE")]
    pub hierarchy: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Order geography constraints into valid for/in parameters
    Resolve(ResolveArgs),

    /// List every area at a geographic level
    Areas(AreasArgs),

    /// Find the code of a named area
    Find(FindArgs),

    /// Fetch data for a geography across years, using the cache
    Fetch(FetchArgs),

    /// Cache management
    Cache(CacheArgs),
}

/// Dataset and vintage shared by most commands
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Dataset path, e.g. "acs/acs5"
    #[arg(short, long, default_value = census::DEFAULT_DATASET)]
    pub dataset: String,

    /// Dataset vintage
    #[arg(short, long, default_value_t = census::DEFAULT_YEAR)]
    pub year: u16,
}

/// Arguments for the resolve command
#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Target geography as level:value (repeatable; the most granular wins)
    #[arg(long = "for", value_name = "LEVEL:VALUE", value_parser = parse_geo_arg, required = true)]
    pub targets: Vec<(String, String)>,

    /// Enclosing geography as level:value (repeatable)
    #[arg(long = "in", value_name = "LEVEL:VALUE", value_parser = parse_geo_arg)]
    pub ancestors: Vec<(String, String)>,

    /// Also replace area names with codes using the geography catalog
    #[arg(long)]
    pub lookup: bool,
}

/// Arguments for the areas command
#[derive(Args, Debug, Clone)]
pub struct AreasArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Geographic level, e.g. "county" or "state"
    #[arg(value_name = "LEVEL")]
    pub level: String,

    /// Parent geography as level:code (repeatable)
    #[arg(long = "in", value_name = "LEVEL:CODE", value_parser = parse_geo_arg)]
    pub parents: Vec<(String, String)>,

    /// Ignore cached enumerations
    #[arg(short, long)]
    pub force: bool,

    /// Maximum number of areas to print
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for the find command
#[derive(Args, Debug, Clone)]
pub struct FindArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Area name, e.g. "Los Angeles"
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Geographic level to search
    #[arg(short, long)]
    pub level: String,

    /// Parent geography as level:code (repeatable)
    #[arg(long = "in", value_name = "LEVEL:CODE", value_parser = parse_geo_arg)]
    pub parents: Vec<(String, String)>,
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Dataset path, e.g. "acs/acs5"
    #[arg(short, long, default_value = census::DEFAULT_DATASET)]
    pub dataset: String,

    /// Years to fetch (comma separated or repeated)
    #[arg(short, long = "year", value_delimiter = ',', required = true)]
    pub years: Vec<u16>,

    /// Variables to fetch (comma separated or repeated)
    #[arg(short, long = "get", value_delimiter = ',', required = true)]
    pub measures: Vec<String>,

    /// Target geography as level:value (repeatable; the most granular wins)
    #[arg(long = "for", value_name = "LEVEL:VALUE", value_parser = parse_geo_arg, required = true)]
    pub targets: Vec<(String, String)>,

    /// Enclosing geography as level:value (repeatable)
    #[arg(long = "in", value_name = "LEVEL:VALUE", value_parser = parse_geo_arg)]
    pub ancestors: Vec<(String, String)>,

    /// Record the query in this user's history
    #[arg(long)]
    pub user: Option<String>,

    /// What to do when variables exceed the per-request limit
    #[arg(long)]
    pub overflow: Option<OverflowPolicy>,

    /// Number of concurrent fetches
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Write the rows of every successful query to this JSON file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Plan only - show the queries without running them
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics and information
    Info,

    /// Remove results and history older than the retention window
    Prune {
        /// Retention window in days (defaults to the configured value)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Remove every cached result
    Clear,
}

/// Parse a `level:value` pair
///
/// The value may itself contain colons; only the first one separates.
pub fn parse_geo_arg(raw: &str) -> Result<(String, String), String> {
    let (level, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected LEVEL:VALUE, got '{}'", raw))?;
    let level = level.trim();
    let value = value.trim();
    if level.is_empty() || value.is_empty() {
        return Err(format!("expected LEVEL:VALUE, got '{}'", raw));
    }
    Ok((level.to_string(), value.to_string()))
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }

    /// Whether any of the verbosity flags was given
    pub fn has_verbosity_flag(&self) -> bool {
        self.global.quiet || self.global.verbose || self.global.very_verbose
    }
}

impl FetchArgs {
    /// Reject argument combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Number of workers must be greater than 0".to_string());
        }
        if self.measures.iter().any(|m| m.trim().is_empty()) {
            return Err("Variable names cannot be empty".to_string());
        }
        Ok(())
    }
}
