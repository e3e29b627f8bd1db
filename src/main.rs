//! job-harvest main entry point
//!
//! This is the command-line interface for the job-harvest aggregator.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use job_harvest::config::{load_config_with_hash, Config, ExtractionConfig};
use job_harvest::output::{load_statistics, print_run_summary, print_statistics};
use job_harvest::{Runner, TriggerType};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// job-harvest: a polite job-posting aggregator
///
/// job-harvest crawls configured employer sites while respecting robots.txt
/// and crawl delays, extracts job postings, and keeps a catalog of when each
/// posting was first and last seen.
#[derive(Parser, Debug)]
#[command(name = "job-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite job-posting aggregator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape all eligible sources, or one source with --source
    Run {
        /// Scrape only this source
        #[arg(long, value_name = "NAME")]
        source: Option<String>,

        /// Record the run as triggered by a scheduler
        #[arg(long, conflicts_with = "source")]
        scheduled: bool,
    },

    /// Mark unseen postings stale and delete expired ones
    Lifecycle,

    /// Refetch robots.txt for a source and update its block
    Recheck {
        /// Source name
        name: String,
    },

    /// List configured sources and their eligibility
    Sources,

    /// Show catalog and recent run statistics
    Stats {
        /// Number of recent runs to show
        #[arg(long, default_value_t = 10)]
        runs: usize,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Command::CheckConfig = cli.command {
        handle_check_config(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let mut runner = Runner::from_config(config, Some(config_hash))
        .context("Failed to initialize the harvester")?;

    match cli.command {
        Command::Run { source, scheduled } => {
            let summary = match source {
                Some(name) => runner.run_single(&name).await,
                None if scheduled => runner.run_all(TriggerType::Scheduled).await,
                None => runner.run_all(TriggerType::ManualAll).await,
            };
            print_run_summary(&summary);
            Ok(if summary.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Lifecycle => {
            let report = runner.run_lifecycle(Utc::now())?;
            println!(
                "Marked {} postings stale, deleted {} expired postings",
                report.marked_stale, report.deleted
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Recheck { name } => {
            let allowed = runner.recheck(&name).await?;
            if allowed {
                println!("✓ {} is allowed by robots.txt", name);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("✗ {} is denied by robots.txt", name);
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Sources => {
            handle_sources(&runner)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats { runs } => {
            runner.sync_sources()?;
            let storage = runner.storage();
            let storage = storage.lock().unwrap_or_else(|e| e.into_inner());
            let stats = load_statistics(&*storage, runs)?;
            println!("Database: {}\n", runner.config().output.database_path);
            print_statistics(&stats);
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckConfig => Ok(ExitCode::SUCCESS),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("job_harvest=info,warn"),
            1 => EnvFilter::new("job_harvest=debug,info"),
            2 => EnvFilter::new("job_harvest=trace,debug"),
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

/// Handles `check-config`: shows what a run would use
fn handle_check_config(config: &Config) {
    println!("=== job-harvest Configuration ===\n");

    println!("User Agent: {}", config.user_agent.header_value());
    println!("Database: {}", config.output.database_path);
    match &config.render.service_url {
        Some(url) => println!("Render service: {} ({}s)", url, config.render.timeout_secs),
        None => println!("Render service: disabled"),
    }
    println!(
        "Lifecycle: stale after {}h, deleted after {}d stale",
        config.lifecycle.inactivity_hours, config.lifecycle.retention_days
    );

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        let strategy = match &source.extraction {
            ExtractionConfig::Selectors(s) => format!("selectors, up to {} pages", s.max_pages),
            ExtractionConfig::Custom { name, .. } => format!("custom '{}'", name),
        };
        let inactive = if source.active { "" } else { " [inactive]" };
        println!("  - {}: {} ({}){}", source.name, source.listing_url(), strategy, inactive);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles `sources`: lists stored sources and their eligibility
fn handle_sources(runner: &Runner) -> anyhow::Result<()> {
    let sources = runner.sync_sources()?;

    println!("=== Sources ({}) ===\n", sources.len());
    for source in &sources {
        let status = if !source.active {
            "inactive".to_string()
        } else if source.robots_blocked {
            format!(
                "blocked by robots.txt since {}",
                source.robots_blocked_at.as_deref().unwrap_or("unknown")
            )
        } else {
            "eligible".to_string()
        };

        let last_scrape = match (&source.last_scraped_at, source.last_scrape_success) {
            (Some(at), Some(true)) => format!("last scraped {} (ok)", at),
            (Some(at), _) => format!("last scraped {} (failed)", at),
            (None, _) => "never scraped".to_string(),
        };

        println!("  {}: {}, {}", source.name(), status, last_scrape);
    }

    Ok(())
}
