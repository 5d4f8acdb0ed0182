//! Command-line interface components
//!
//! This module contains CLI-specific code for the census_geo binary:
//! argument parsing and the command handlers.

pub mod args;
pub mod commands;

pub use args::{
    parse_geo_arg, AreasArgs, CacheAction, CacheArgs, Cli, Commands, DatasetArgs, FetchArgs,
    FindArgs, GlobalArgs, ResolveArgs,
};
pub use commands::{handle_areas, handle_cache, handle_fetch, handle_find, handle_resolve};
