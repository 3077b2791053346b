//! f1-results
//!
//! Fetches Formula 1 race and qualifying results from the Ergast API and
//! stores them in a local SQLite database.

mod cli;
mod config;
mod ergast;
mod ingest;
mod storage;

use anyhow::Context;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::config::{AppConfig, LoggingConfig};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Override with CLI args
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    init_logging(&config.logging)?;
    tracing::debug!("Configuration loaded: {:?}", config);

    match cli.command {
        Commands::Ingest {
            seasons,
            rounds,
            qualifying,
            format,
        } => cli::run_ingest(&config, seasons, rounds, qualifying, format),
        Commands::Show {
            season,
            race,
            format,
        } => cli::run_show(&config, season, race, format),
    }
}

/// Initialize logging to stderr, plus a plain-text file when configured.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.filter.as_str().into());

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating log directory {}", parent.display()))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}
