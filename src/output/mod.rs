//! Output module for catalog reports
//!
//! This module handles:
//! - Loading catalog and run statistics
//! - Printing statistics and run summaries for operators

pub mod stats;

pub use stats::{load_statistics, print_statistics, CatalogStatistics};

use crate::crawler::RunSummary;

/// Prints a run summary to stdout
///
/// Only sanitized per-source error summaries are shown; details are in the log.
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Run Summary ===\n");

    if let Some(id) = summary.run_log_id {
        println!("Run log: #{}", id);
    }
    println!(
        "Jobs: {} found, {} added, {} updated",
        summary.found, summary.added, summary.updated
    );

    if let Some(error) = &summary.error {
        println!("Run failed: {}", error);
    }

    if !summary.outcomes.is_empty() {
        println!("\nSources:");
        for outcome in &summary.outcomes {
            match &outcome.error {
                None => println!(
                    "  ✓ {}: {} found, {} added, {} updated",
                    outcome.source_name, outcome.found, outcome.added, outcome.updated
                ),
                Some(error) => println!("  ✗ {}: {}", outcome.source_name, error),
            }
        }
    }
}
