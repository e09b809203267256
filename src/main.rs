//! Linkwatch main entry point
//!
//! This is the command-line interface: a task-queue worker plus the operator
//! commands that queue checks and inspect the database.

use anyhow::Context;
use clap::{Parser, Subcommand};
use linkwatch::config::{load_config_with_hash, Config};
use linkwatch::dispatch::{Task, TaskQueue, Worker};
use linkwatch::output::{load_statistics, print_dry_run, print_statistics};
use linkwatch::storage::{open_storage, SqliteStorage, Storage};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Linkwatch: a backlink verification engine
///
/// Linkwatch re-visits placed backlinks and records whether they still exist,
/// point at the right target and carry the required attributes. Blocked pages
/// are retried through proxies and finally a headless browser.
#[derive(Parser, Debug)]
#[command(name = "linkwatch")]
#[command(version = "1.0.0")]
#[command(about = "A backlink verification engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume the task queue
    Worker {
        /// Exit once the queue is empty instead of polling forever
        #[arg(long)]
        once: bool,
    },

    /// Queue a check of one link
    CheckLink { id: i64 },

    /// Queue a check of several links
    CheckLinks {
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Skip the direct and proxy stages
        #[arg(long)]
        browser: bool,
    },

    /// Queue a check of every link
    CheckAll,

    /// Queue a check of the links created in one year
    CheckYear { year: i32 },

    /// Queue the daily check (links outside browser mode and browser-mode failures)
    CheckDaily,

    /// Queue a browser re-check of stale green links
    CheckStale,

    /// Queue donor domains for country and language tagging
    TagDomains {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Register a link placement
    AddLink {
        page_url: String,
        link_url: String,
        anchor: String,
    },

    /// Show statistics from the database
    Stats,

    /// Validate the configuration and show what a worker would use
    DryRun,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::DryRun => {
            print_dry_run(&config, &config_hash);
            println!("\n✓ Configuration is valid");
        }
        Command::Stats => handle_stats(&config)?,
        Command::Worker { once } => handle_worker(&config, once).await?,
        Command::AddLink {
            page_url,
            link_url,
            anchor,
        } => {
            let mut storage = open(&config)?;
            let id = storage.insert_link(&page_url, &link_url, &anchor)?;
            println!("Added link {}", id);
        }
        Command::CheckLink { id } => enqueue(&config, Task::CheckLinkById { id })?,
        Command::CheckLinks { ids, browser: true } => {
            enqueue(&config, Task::CheckLinksByIdListViaBrowser { ids })?
        }
        Command::CheckLinks { ids, browser: false } => {
            enqueue(&config, Task::CheckLinksByIdList { ids })?
        }
        Command::CheckAll => enqueue(&config, Task::CheckAllLinks)?,
        Command::CheckYear { year } => enqueue(&config, Task::CheckLinksByYear { year })?,
        Command::CheckDaily => enqueue(&config, Task::CheckDaily)?,
        Command::CheckStale => enqueue(&config, Task::CheckStale)?,
        Command::TagDomains { ids } => {
            enqueue(&config, Task::CheckDonorDomainsWithTagger { domain_ids: ids })?
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("linkwatch=info,warn"),
            1 => EnvFilter::new("linkwatch=debug,info"),
            2 => EnvFilter::new("linkwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open(config: &Config) -> anyhow::Result<SqliteStorage> {
    open_storage(&config.database)
        .with_context(|| format!("failed to open database {}", config.database.path))
}

/// Pushes one task onto the queue for the workers
fn enqueue(config: &Config, task: Task) -> anyhow::Result<()> {
    let mut storage = open(config)?;
    let id = storage.push(&task)?;
    println!("Queued task {} ({})", id, task.kind());
    Ok(())
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.database.path);

    let storage = open(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the worker command
async fn handle_worker(config: &Config, once: bool) -> anyhow::Result<()> {
    let storage = Arc::new(Mutex::new(open(config)?));
    let worker = Worker::new(config, storage);

    match worker.run(once).await {
        Ok(report) => {
            tracing::info!(
                "Worker exited: {} completed, {} failed",
                report.completed,
                report.failed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Worker stopped: {}", e);
            Err(e.into())
        }
    }
}
