mod config;
mod database;
mod pool;
mod render;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pinger::CycleRunner;
use serde::Serialize;

use crate::config::Config;
use crate::database::{LibsqlIncidentStore, LibsqlSnapshotCache, initialize_database};

/// Rows shown by `incidents` when no limit is given.
const DEFAULT_INCIDENT_ROWS: usize = 5;

#[derive(Parser)]
#[command(name = "pinger", version, about = "Checks network services and alerts when they go down")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/pinger/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single check cycle (for cron and other external schedulers)
    Run,
    /// Run check cycles on an interval until Ctrl-C
    Watch {
        /// Seconds between cycles, overriding [schedule] interval_secs
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Show the last known state without checking anything
    Status,
    /// List the most recent incidents
    Incidents {
        #[arg(short, long, default_value_t = DEFAULT_INCIDENT_ROWS)]
        limit: usize,
    },
    /// Forget cached state; the next cycle starts from the config file
    ClearCache,
    /// Delete the incident history
    ClearIncidents,
    /// Send a test notification to every subscriber
    TestNotify,
    /// Print the effective configuration
    Config,
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}

async fn build_runner(config: &Config) -> Result<CycleRunner> {
    let pool = pool::open(&config.database.path, config.database.max_connections).await?;

    let conn = pool.get().await.context("Failed to get database connection")?;
    initialize_database(&conn).await.context("Failed to initialize database schema")?;
    drop(conn);

    let incidents = Arc::new(LibsqlIncidentStore::new(pool.clone()));
    let cache = Arc::new(LibsqlSnapshotCache::new(pool));

    CycleRunner::from_site(config.site.clone(), incidents, cache)
        .context("Invalid site configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;

    if let Command::Config = cli.command {
        print!("{config}");
        return Ok(());
    }

    let runner = build_runner(&config).await?;

    match cli.command {
        Command::Run => {
            let report = runner.run_once().await?;
            print(cli.json, &report, || render::cycle(&report))?;
        }
        Command::Watch { interval } => {
            let secs = interval.unwrap_or(config.schedule.interval_secs).max(1);
            scheduler::watch(&runner, Duration::from_secs(secs)).await?;
        }
        Command::Status => {
            let monitor = runner.status().await?;
            let view = render::StatusView::new(&monitor, Utc::now());
            print(cli.json, &view, || render::status(&view))?;
        }
        Command::Incidents { limit } => {
            let records = runner.recent_incidents(limit).await?;
            print(cli.json, &records, || render::incidents(&records))?;
        }
        Command::ClearCache => {
            runner.clear_cache().await?;
            println!("Cleared cached state for {}", config.site.site);
        }
        Command::ClearIncidents => {
            runner.clear_incidents().await?;
            println!("Cleared incident history");
        }
        Command::TestNotify => {
            let report = runner.test_notify().await?;
            print!("{}", render::dispatch(&report));
        }
        Command::Config => print!("{config}"),
    }

    Ok(())
}
