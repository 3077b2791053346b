//! CLI commands for f1-results.
//!
//! `ingest` pulls results from the API into the database, `show` prints
//! what is stored.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::ergast::ErgastClient;
use crate::ingest::{ingest_results, IngestReport, IngestRequest};
use crate::storage::{QualifyingResult, Race, RaceRepository, RaceResult};

#[derive(Parser)]
#[command(name = "f1-results")]
#[command(version, about = "Ingest F1 race and qualifying results into SQLite", long_about = None)]
pub struct Cli {
    /// Database path override
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch results for one or more seasons and store them
    Ingest {
        /// Seasons to ingest (e.g. 2022,2023)
        #[arg(short, long = "season", value_delimiter = ',')]
        seasons: Vec<u32>,

        /// Only ingest these rounds of each season
        #[arg(short, long = "round", value_delimiter = ',')]
        rounds: Vec<u32>,

        /// Ingest qualifying instead of race results
        #[arg(short, long)]
        qualifying: bool,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Print stored races, or the classification of one race
    Show {
        /// Restrict races to one season
        #[arg(short, long)]
        season: Option<u32>,

        /// Race id (e.g. 2023_1) to print results for
        #[arg(short, long)]
        race: Option<String>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

fn open_repository(path: &Path) -> anyhow::Result<RaceRepository> {
    RaceRepository::new(path).with_context(|| format!("opening database {}", path.display()))
}

/// Run ingestion, then print the stored races of the requested seasons.
pub fn run_ingest(
    config: &AppConfig,
    seasons: Vec<u32>,
    rounds: Vec<u32>,
    qualifying: bool,
    format: String,
) -> anyhow::Result<()> {
    let request = IngestRequest {
        seasons,
        rounds: if rounds.is_empty() { None } else { Some(rounds) },
        qualifying,
    };
    // Fail before touching the network or the database
    request.validate()?;

    let client = ErgastClient::new(&config.api).context("creating HTTP client")?;
    let mut repo = open_repository(&config.storage.db_path)?;

    eprintln!("Ingesting {} for seasons {:?}", request.kind(), request.seasons);
    let report = ingest_results(&client, &mut repo, &request)?;
    print_report(&report);
    eprintln!(
        "Database now holds {} race(s), {} result(s), {} qualifying row(s)",
        repo.race_count()?,
        repo.result_count()?,
        repo.qualifying_count()?
    );

    let mut races = Vec::new();
    for season in &request.seasons {
        races.extend(repo.get_races(Some(season.to_string().as_str()))?);
    }
    print_races(&races, &format)?;

    if !report.is_clean() {
        anyhow::bail!("{} item(s) failed to ingest", report.failures.len());
    }
    Ok(())
}

/// Print stored rows.
pub fn run_show(
    config: &AppConfig,
    season: Option<u32>,
    race: Option<String>,
    format: String,
) -> anyhow::Result<()> {
    let repo = open_repository(&config.storage.db_path)?;

    match race {
        Some(race_id) => {
            if !repo.race_exists(&race_id)? {
                anyhow::bail!("race {} is not in the database", race_id);
            }
            let results = repo.get_race_results(&race_id)?;
            let qualifying = repo.get_qualifying(&race_id)?;
            print_classification(&race_id, &results, &qualifying, &format)
        }
        None => {
            let season = season.map(|s| s.to_string());
            let races = repo.get_races(season.as_deref())?;
            print_races(&races, &format)
        }
    }
}

fn print_report(report: &IngestReport) {
    eprintln!(
        "Stored {} race(s) with {} classified entries",
        report.races_stored, report.entries_stored
    );
    for failure in &report.failures {
        eprintln!("  failed: {}", failure);
    }
}

fn print_races(races: &[Race], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(races)?);
        }
        "table" => {
            println!("=== Races ===");
            for race in races {
                println!(
                    "  {:<8} {:>2}. {:<32} {} {}",
                    race.race_id,
                    race.round,
                    race.race_name,
                    race.race_date,
                    race.race_time.as_deref().unwrap_or("-")
                );
            }
        }
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(races)?);
        }
    }
    Ok(())
}

fn print_classification(
    race_id: &str,
    results: &[RaceResult],
    qualifying: &[QualifyingResult],
    format: &str,
) -> anyhow::Result<()> {
    if format == "json" {
        let output = serde_json::json!({
            "race_id": race_id,
            "results": results,
            "qualifying": qualifying,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Race: {}", race_id);
    println!();

    if !results.is_empty() {
        println!("=== Results ===");
        for r in results {
            println!(
                "  {:2}. {:<24} {:<20} {:>3} pts  grid {:>2}  {:>3} laps  {}{}",
                r.position,
                r.driver_name,
                r.constructor_name,
                r.points,
                r.grid,
                r.laps,
                r.status,
                r.fastest_lap_time
                    .as_deref()
                    .map(|t| format!("  fastest {}", t))
                    .unwrap_or_default()
            );
        }
        println!();
    }

    if !qualifying.is_empty() {
        println!("=== Qualifying ===");
        for q in qualifying {
            println!(
                "  {:2}. {:<24} {:<20} {:>9} {:>9} {:>9}",
                q.position,
                q.driver_name,
                q.constructor_name,
                q.q1.as_deref().unwrap_or("-"),
                q.q2.as_deref().unwrap_or("-"),
                q.q3.as_deref().unwrap_or("-")
            );
        }
        println!();
    }

    Ok(())
}
