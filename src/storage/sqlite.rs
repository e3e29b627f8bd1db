//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::config::SourceConfig;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    to_db_time, ExtractedRecord, JobPosting, ReconcileReport, RunLogEntry, RunLogRecord,
    RunLogSource, SourcePostingCount, SourceRecord, TriggerType, UpsertOutcome,
};
use crate::HarvestError;
use chrono::{DateTime, Datelike, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const POSTING_COLUMNS: &str = "id, source_id, external_id, title, organization, location, state,
     description, job_type, salary_info, url, first_seen_at, last_seen_at, is_stale,
     stale_since, created_at, updated_at";

const SOURCE_COLUMNS: &str = "id, config_json, active, robots_blocked, robots_blocked_at,
     last_scraped_at, last_scrape_success";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn posting_from_row(row: &Row) -> rusqlite::Result<JobPosting> {
    Ok(JobPosting {
        id: row.get(0)?,
        source_id: row.get(1)?,
        external_id: row.get(2)?,
        title: row.get(3)?,
        organization: row.get(4)?,
        location: row.get(5)?,
        state: row.get(6)?,
        description: row.get(7)?,
        job_type: row.get(8)?,
        salary_info: row.get(9)?,
        url: row.get(10)?,
        first_seen_at: row.get(11)?,
        last_seen_at: row.get(12)?,
        is_stale: row.get(13)?,
        stale_since: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<SourceRecord> {
    let json: String = row.get(1)?;
    let config: SourceConfig = serde_json::from_str(&json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(SourceRecord {
        id: row.get(0)?,
        config,
        active: row.get(2)?,
        robots_blocked: row.get(3)?,
        robots_blocked_at: row.get(4)?,
        last_scraped_at: row.get(5)?,
        last_scrape_success: row.get(6)?,
    })
}

fn find_posting(
    conn: &Connection,
    source_id: i64,
    external_id: &str,
) -> rusqlite::Result<Option<JobPosting>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM job_postings WHERE source_id = ?1 AND external_id = ?2",
            POSTING_COLUMNS
        ),
        params![source_id, external_id],
        posting_from_row,
    )
    .optional()
}

/// Picks the incoming value when it is present and differs
///
/// Missing optional values never erase stored ones.
fn merge_field(stored: &Option<String>, incoming: &Option<String>, changed: &mut bool) -> Option<String> {
    match incoming {
        Some(value) if stored.as_deref() != Some(value.as_str()) => {
            *changed = true;
            Some(value.clone())
        }
        _ => stored.clone(),
    }
}

/// Inserts or updates one record
///
/// An existing row always gets `last_seen_at` refreshed and its stale flag
/// cleared; content fields are rewritten only when they differ.
fn upsert_posting(
    conn: &Connection,
    source_id: i64,
    record: &ExtractedRecord,
    now: &str,
) -> rusqlite::Result<UpsertOutcome> {
    let Some(existing) = find_posting(conn, source_id, &record.external_id)? else {
        conn.execute(
            "INSERT INTO job_postings (source_id, external_id, title, organization, location,
             state, description, job_type, salary_info, url, first_seen_at, last_seen_at,
             is_stale, stale_since, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, 0, NULL, ?11, ?11)",
            params![
                source_id,
                record.external_id,
                record.title,
                record.organization,
                record.location,
                record.state,
                record.description,
                record.job_type,
                record.salary_info,
                record.url,
                now,
            ],
        )?;
        return Ok(UpsertOutcome::Inserted);
    };

    let previous = existing.lifecycle_state();
    let mut changed = !previous.is_listed();
    if changed {
        tracing::debug!("Posting {} seen again: {} -> active", existing.external_id, previous);
    }
    if existing.title != record.title || existing.url != record.url {
        changed = true;
    }
    let organization = merge_field(&existing.organization, &record.organization, &mut changed);
    let location = merge_field(&existing.location, &record.location, &mut changed);
    let state = merge_field(&existing.state, &record.state, &mut changed);
    let description = merge_field(&existing.description, &record.description, &mut changed);
    let job_type = merge_field(&existing.job_type, &record.job_type, &mut changed);
    let salary_info = merge_field(&existing.salary_info, &record.salary_info, &mut changed);

    let updated_at = if changed { now } else { existing.updated_at.as_str() };

    conn.execute(
        "UPDATE job_postings SET title = ?1, organization = ?2, location = ?3, state = ?4,
         description = ?5, job_type = ?6, salary_info = ?7, url = ?8, last_seen_at = ?9,
         is_stale = 0, stale_since = NULL, updated_at = ?10
         WHERE id = ?11",
        params![
            record.title,
            organization,
            location,
            state,
            description,
            job_type,
            salary_info,
            record.url,
            now,
            updated_at,
            existing.id,
        ],
    )?;

    Ok(if changed {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Unchanged
    })
}

/// `now - window`, or None when that lies before year 1 and no stored
/// timestamp can be older
fn cutoff_before(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(window).filter(|cutoff| cutoff.year() >= 1)
}

impl Storage for SqliteStorage {
    // ===== Sources =====

    fn sync_sources(
        &mut self,
        sources: &[SourceConfig],
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let now = to_db_time(now);
        let tx = self.conn.transaction()?;

        let mut configured = HashSet::new();
        for source in sources {
            let json = serde_json::to_string(source)?;
            tx.execute(
                "INSERT INTO sources (name, config_json, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                    config_json = excluded.config_json,
                    active = excluded.active,
                    updated_at = excluded.updated_at",
                params![source.name, json, source.active, now],
            )?;
            configured.insert(source.name.as_str());
        }

        let stored: Vec<String> = {
            let mut stmt = tx.prepare("SELECT name FROM sources WHERE active = 1")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for name in stored {
            if !configured.contains(name.as_str()) {
                tracing::info!("Source '{}' no longer configured, deactivating", name);
                tx.execute(
                    "UPDATE sources SET active = 0, updated_at = ?1 WHERE name = ?2",
                    params![now, name],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn list_sources(&self) -> StorageResult<Vec<SourceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sources ORDER BY name",
            SOURCE_COLUMNS
        ))?;
        let rows = stmt.query_map([], source_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn get_source_by_name(&self, name: &str) -> StorageResult<Option<SourceRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM sources WHERE name = ?1", SOURCE_COLUMNS),
                params![name],
                source_from_row,
            )
            .optional()?)
    }

    fn set_robots_blocked(
        &mut self,
        source_id: i64,
        blocked: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let blocked_at = blocked.then(|| to_db_time(now));
        let rows = self.conn.execute(
            "UPDATE sources SET robots_blocked = ?1, robots_blocked_at = ?2, updated_at = ?3
             WHERE id = ?4",
            params![blocked, blocked_at, to_db_time(now), source_id],
        )?;
        if rows == 0 {
            return Err(StorageError::SourceNotFound(format!("id {}", source_id)));
        }
        Ok(())
    }

    fn record_scrape_result(
        &mut self,
        source_id: i64,
        success: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE sources SET last_scraped_at = ?1, last_scrape_success = ?2 WHERE id = ?3",
            params![to_db_time(now), success, source_id],
        )?;
        Ok(())
    }

    // ===== Postings =====

    fn reconcile_source(
        &mut self,
        source_id: i64,
        records: &[ExtractedRecord],
        now: DateTime<Utc>,
    ) -> StorageResult<ReconcileReport> {
        let now = to_db_time(now);
        let mut report = ReconcileReport::default();
        let mut tx = self.conn.transaction()?;
        let mut saved: HashSet<&str> = HashSet::new();

        for record in records {
            if saved.contains(record.external_id.as_str()) {
                tracing::debug!("Skipping repeated posting {}", record.external_id);
                continue;
            }

            let sp = tx.savepoint()?;
            let outcome = upsert_posting(&sp, source_id, record, &now)
                .and_then(|outcome| sp.commit().map(|_| outcome));

            // Counters move only once the savepoint is committed
            match outcome {
                Ok(outcome) => {
                    saved.insert(&record.external_id);
                    report.found += 1;
                    match outcome {
                        UpsertOutcome::Inserted => report.added += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                        UpsertOutcome::Unchanged => {}
                    }
                    tracing::debug!("{} {:?}", record.external_id, outcome);
                }
                Err(e) => {
                    tracing::warn!("Failed to save posting {}: {}", record.external_id, e);
                    report.failures.push((record.external_id.clone(), e.to_string()));
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }

    fn get_posting(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> StorageResult<Option<JobPosting>> {
        Ok(find_posting(&self.conn, source_id, external_id)?)
    }

    fn list_postings(&self, source_id: i64) -> StorageResult<Vec<JobPosting>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM job_postings WHERE source_id = ?1 ORDER BY id",
            POSTING_COLUMNS
        ))?;
        let rows = stmt.query_map(params![source_id], posting_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn mark_stale(&mut self, now: DateTime<Utc>, window: Duration) -> StorageResult<usize> {
        let Some(cutoff) = cutoff_before(now, window) else {
            return Ok(0);
        };
        let cutoff = to_db_time(cutoff);
        let marked = self.conn.execute(
            "UPDATE job_postings SET is_stale = 1, stale_since = ?1
             WHERE is_stale = 0 AND last_seen_at < ?2",
            params![to_db_time(now), cutoff],
        )?;
        Ok(marked)
    }

    fn purge_stale(&mut self, now: DateTime<Utc>, retention: Duration) -> StorageResult<usize> {
        let Some(cutoff) = cutoff_before(now, retention) else {
            return Ok(0);
        };
        let cutoff = to_db_time(cutoff);
        let deleted = self.conn.execute(
            "DELETE FROM job_postings
             WHERE is_stale = 1 AND COALESCE(stale_since, last_seen_at) < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    // ===== Bookmarks =====

    fn save_job(&mut self, user_id: i64, job_id: i64, now: DateTime<Utc>) -> StorageResult<()> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM job_postings WHERE id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::PostingNotFound(job_id));
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO saved_jobs (user_id, job_id, saved_at) VALUES (?1, ?2, ?3)",
            params![user_id, job_id, to_db_time(now)],
        )?;
        Ok(())
    }

    fn count_saved_jobs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM saved_jobs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Run logs =====

    fn record_run(&mut self, entry: &RunLogEntry) -> StorageResult<i64> {
        let (found, added, updated) = entry.sources.iter().fold((0, 0, 0), |acc, s| {
            (acc.0 + s.found, acc.1 + s.added, acc.2 + s.updated)
        });

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO run_logs (trigger_type, trigger_source, started_at, finished_at,
             success, error, config_hash, jobs_found, jobs_added, jobs_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.trigger.to_db_string(),
                entry.trigger.source_name(),
                to_db_time(entry.started_at),
                to_db_time(entry.finished_at),
                entry.success(),
                entry.error,
                entry.config_hash,
                found as i64,
                added as i64,
                updated as i64,
            ],
        )?;
        let run_log_id = tx.last_insert_rowid();

        for source in &entry.sources {
            tx.execute(
                "INSERT INTO run_log_sources (run_log_id, source_id, source_name, success,
                 jobs_found, jobs_added, jobs_updated, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_log_id,
                    source.source_id,
                    source.source_name,
                    source.success(),
                    source.found as i64,
                    source.added as i64,
                    source.updated as i64,
                    source.error,
                ],
            )?;
        }

        tx.commit()?;
        Ok(run_log_id)
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunLogRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trigger_type, trigger_source, started_at, finished_at, success, error,
             config_hash, jobs_found, jobs_added, jobs_updated
             FROM run_logs ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let kind: String = row.get(1)?;
            let trigger = TriggerType::from_db_parts(&kind, row.get(2)?).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    Type::Text,
                    format!("unknown trigger type '{}'", kind).into(),
                )
            })?;

            Ok(RunLogRecord {
                id: row.get(0)?,
                trigger,
                started_at: row.get(3)?,
                finished_at: row.get(4)?,
                success: row.get(5)?,
                error: row.get(6)?,
                config_hash: row.get(7)?,
                jobs_found: row.get::<_, i64>(8)? as u64,
                jobs_added: row.get::<_, i64>(9)? as u64,
                jobs_updated: row.get::<_, i64>(10)? as u64,
            })
        })?;

        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn run_sources(&self, run_log_id: i64) -> StorageResult<Vec<RunLogSource>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, source_name, jobs_found, jobs_added, jobs_updated, error
             FROM run_log_sources WHERE run_log_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![run_log_id], |row| {
            Ok(RunLogSource {
                source_id: row.get(0)?,
                source_name: row.get(1)?,
                found: row.get::<_, i64>(2)? as usize,
                added: row.get::<_, i64>(3)? as usize,
                updated: row.get::<_, i64>(4)? as usize,
                error: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<Result<_, _>>()?)
    }

    // ===== Statistics =====

    fn count_postings(&self, stale: bool) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM job_postings WHERE is_stale = ?1",
            params![stale],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn postings_per_source(&self) -> StorageResult<Vec<SourcePostingCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.name,
                    COALESCE(SUM(CASE WHEN p.is_stale = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN p.is_stale = 1 THEN 1 ELSE 0 END), 0)
             FROM sources s
             LEFT JOIN job_postings p ON p.source_id = s.id
             GROUP BY s.id
             ORDER BY s.name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(SourcePostingCount {
                source_name: row.get(0)?,
                active: row.get::<_, i64>(1)? as u64,
                stale: row.get::<_, i64>(2)? as u64,
            })
        })?;

        Ok(rows.collect::<Result<_, _>>()?)
    }
}
