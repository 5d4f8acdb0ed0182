//! census_geo CLI application
//!
//! Command-line interface for resolving US Census geographies and running
//! cached data API queries.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// Import CLI modules through the library (module is public but not re-exported)
use census_geo::cli::{
    handle_areas, handle_cache, handle_fetch, handle_find, handle_resolve, Cli, Commands,
};
use census_geo::config::AppConfig;
use census_geo::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load CENSUS_API_KEY from a .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // Configured level applies only when no verbosity flag is given
    let configured_level = AppConfig::load(cli.global.config.clone())
        .await
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "warn".to_string());
    init_logging(&cli, &configured_level);

    info!("census_geo v{} starting", env!("CARGO_PKG_VERSION"));

    let global = cli.global;
    match cli.command {
        Commands::Resolve(args) => {
            info!("Executing resolve command");
            handle_resolve(args, &global).await
        }
        Commands::Areas(args) => {
            info!("Executing areas command");
            handle_areas(args, &global).await
        }
        Commands::Find(args) => {
            info!("Executing find command");
            handle_find(args, &global).await
        }
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(args, &global).await
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(args, &global).await
        }
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli, configured_level: &str) {
    let log_level = if cli.has_verbosity_flag() {
        cli.log_level().to_string()
    } else {
        configured_level.to_string()
    };

    let filter = match format!("census_geo={}", log_level).parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
