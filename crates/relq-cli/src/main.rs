//! relq command-line driver
//!
//! Reads a relational IR query (JSON), translates it to SQL and prints the
//! command text, bound parameters and materializer plan.

use anyhow::Result;
use clap::Parser;
use tracing::warn;

mod cli;
mod config;
mod logging;
mod translate;

use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config_path = &cli.global.config;
    let config_found = config_path.exists();
    let config = if config_found {
        Config::load(config_path)?
    } else {
        Config::from_env()?
    };

    config.apply_logging_env();
    logging::init();

    if !config_found {
        warn!(path = %config_path.display(), "config file not found, using defaults");
    }

    match &cli.command {
        Commands::Translate(args) => translate::run(args, &config),
        Commands::Fingerprint(args) => translate::fingerprint(args),
    }
}
