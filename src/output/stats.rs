//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog and run statistics from the storage layer.

use crate::storage::{RunLogRecord, SourcePostingCount, Storage};
use crate::HarvestError;

/// Catalog statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    /// Postings currently listed
    pub active_postings: u64,

    /// Postings hidden as stale, awaiting retention deletion
    pub stale_postings: u64,

    /// Posting counts per source
    pub per_source: Vec<SourcePostingCount>,

    /// Configured sources that are active
    pub active_sources: u64,

    /// Sources currently blocked by robots.txt
    pub blocked_sources: Vec<String>,

    /// Bookmarks referencing postings
    pub saved_jobs: u64,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunLogRecord>,
}

impl CatalogStatistics {
    pub fn total_postings(&self) -> u64 {
        self.active_postings + self.stale_postings
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `recent_runs` - How many run log entries to include
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    recent_runs: usize,
) -> Result<CatalogStatistics, HarvestError> {
    let sources = storage.list_sources()?;

    let active_sources = sources.iter().filter(|s| s.active).count() as u64;
    let blocked_sources = sources
        .iter()
        .filter(|s| s.active && s.robots_blocked)
        .map(|s| s.name().to_string())
        .collect();

    Ok(CatalogStatistics {
        active_postings: storage.count_postings(false)?,
        stale_postings: storage.count_postings(true)?,
        per_source: storage.postings_per_source()?,
        active_sources,
        blocked_sources,
        saved_jobs: storage.count_saved_jobs()?,
        recent_runs: storage.recent_runs(recent_runs)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Postings:");
    println!("  Active: {}", stats.active_postings);
    println!("  Stale: {}", stats.stale_postings);
    println!("  Saved by users: {}", stats.saved_jobs);
    println!();

    if !stats.per_source.is_empty() {
        println!("Postings by Source:");
        for count in &stats.per_source {
            println!(
                "  {}: {} active, {} stale",
                count.source_name, count.active, count.stale
            );
        }
        println!();
    }

    println!("Sources:");
    println!("  Active: {}", stats.active_sources);
    if !stats.blocked_sources.is_empty() {
        println!(
            "  Blocked by robots.txt ({}):",
            stats.blocked_sources.len()
        );
        for name in &stats.blocked_sources {
            println!("    - {}", name);
        }
    }
    println!();

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            let status = if run.success { "ok" } else { "failed" };
            let trigger = match run.trigger.source_name() {
                Some(name) => format!("{} ({})", run.trigger.to_db_string(), name),
                None => run.trigger.to_db_string().to_string(),
            };
            println!(
                "  #{} {} {} [{}]: {} found, {} added, {} updated",
                run.id,
                run.started_at,
                trigger,
                status,
                run.jobs_found,
                run.jobs_added,
                run.jobs_updated
            );
            if let Some(error) = &run.error {
                println!("      {}", error);
            }
        }
    }
}
