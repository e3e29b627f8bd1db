//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::config::SourceConfig;
use crate::storage::{
    ExtractedRecord, JobPosting, LifecycleReport, ReconcileReport, RunLogEntry, RunLogRecord,
    RunLogSource, SourcePostingCount, SourceRecord,
};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Posting not found: {0}")]
    PostingNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every method that records time takes `now` from the caller, so the
/// lifecycle can be driven deterministically.
pub trait Storage {
    // ===== Sources =====

    /// Upserts configured sources by name
    ///
    /// Configuration and the `active` flag are refreshed; runtime state
    /// (robots block, last scrape) is kept. Stored sources missing from
    /// `sources` are deactivated, not deleted.
    fn sync_sources(&mut self, sources: &[SourceConfig], now: DateTime<Utc>)
        -> StorageResult<()>;

    /// All sources, ordered by name
    fn list_sources(&self) -> StorageResult<Vec<SourceRecord>>;

    fn get_source_by_name(&self, name: &str) -> StorageResult<Option<SourceRecord>>;

    /// Sets or clears the robots block on a source
    fn set_robots_blocked(
        &mut self,
        source_id: i64,
        blocked: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Records when a source was last scraped and whether it succeeded
    fn record_scrape_result(
        &mut self,
        source_id: i64,
        success: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ===== Postings =====

    /// Reconciles one source's extracted records in a single transaction
    ///
    /// Each record is written inside its own savepoint; a failing record
    /// rolls back alone and is listed in the report's failures.
    fn reconcile_source(
        &mut self,
        source_id: i64,
        records: &[ExtractedRecord],
        now: DateTime<Utc>,
    ) -> StorageResult<ReconcileReport>;

    fn get_posting(&self, source_id: i64, external_id: &str)
        -> StorageResult<Option<JobPosting>>;

    fn list_postings(&self, source_id: i64) -> StorageResult<Vec<JobPosting>>;

    /// Marks postings not seen within `window` as stale
    ///
    /// # Returns
    ///
    /// Number of postings that became stale
    fn mark_stale(&mut self, now: DateTime<Utc>, window: Duration) -> StorageResult<usize>;

    /// Deletes postings that have been stale longer than `retention`
    ///
    /// Bookmarks referencing a deleted posting are removed with it.
    fn purge_stale(&mut self, now: DateTime<Utc>, retention: Duration) -> StorageResult<usize>;

    /// Runs the staleness pass followed by the retention pass
    fn run_lifecycle(
        &mut self,
        now: DateTime<Utc>,
        inactivity: Duration,
        retention: Duration,
    ) -> StorageResult<LifecycleReport> {
        let marked_stale = self.mark_stale(now, inactivity)?;
        let deleted = self.purge_stale(now, retention)?;
        Ok(LifecycleReport {
            marked_stale,
            deleted,
        })
    }

    // ===== Bookmarks =====

    fn save_job(&mut self, user_id: i64, job_id: i64, now: DateTime<Utc>) -> StorageResult<()>;

    fn count_saved_jobs(&self) -> StorageResult<u64>;

    // ===== Run logs =====

    /// Writes a run log entry with its per-source lines
    fn record_run(&mut self, entry: &RunLogEntry) -> StorageResult<i64>;

    /// Most recent run log entries, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunLogRecord>>;

    fn run_sources(&self, run_log_id: i64) -> StorageResult<Vec<RunLogSource>>;

    // ===== Statistics =====

    fn count_postings(&self, stale: bool) -> StorageResult<u64>;

    /// Active and stale posting counts per source, ordered by source name
    fn postings_per_source(&self) -> StorageResult<Vec<SourcePostingCount>>;
}
