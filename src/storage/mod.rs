//! Storage module for the posting catalog
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Source sync and runtime source state (robots block, last scrape)
//! - Per-source reconciliation of extracted postings with per-record savepoints
//! - The staleness and retention lifecycle pass
//! - Run log persistence

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::SourceConfig;
use crate::state::PostingState;
use crate::HarvestError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Initializes or opens a storage database, creating its directory if needed
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStorage::new(path)
}

/// Formats a timestamp the way it is stored
///
/// Fixed width with microseconds and `Z`, so text order is time order.
pub fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp
pub fn from_db_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A source row: its configuration plus runtime state
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: i64,
    pub config: SourceConfig,
    pub active: bool,
    pub robots_blocked: bool,
    pub robots_blocked_at: Option<String>,
    pub last_scraped_at: Option<String>,
    pub last_scrape_success: Option<bool>,
}

impl SourceRecord {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Active and not currently denied by robots policy
    pub fn is_eligible(&self) -> bool {
        self.active && !self.robots_blocked
    }
}

/// One candidate posting produced by extraction
///
/// Never stored as-is; reconciliation maps it onto a `JobPosting` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub organization: Option<String>,
    pub location: Option<String>,
    pub state: Option<String>,
    pub description: Option<String>,
    pub job_type: Option<String>,
    pub salary_info: Option<String>,
}

/// A persisted posting
#[derive(Debug, Clone)]
pub struct JobPosting {
    pub id: i64,
    pub source_id: i64,
    pub external_id: String,
    pub title: String,
    pub organization: Option<String>,
    pub location: Option<String>,
    pub state: Option<String>,
    pub description: Option<String>,
    pub job_type: Option<String>,
    pub salary_info: Option<String>,
    pub url: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub is_stale: bool,
    pub stale_since: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobPosting {
    pub fn lifecycle_state(&self) -> PostingState {
        PostingState::from_stale_flag(self.is_stale)
    }
}

/// What reconciling one record did to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Content changed, or a stale posting was seen again
    Updated,
    /// Only last_seen_at moved
    Unchanged,
}

/// Counts from reconciling one source's records
///
/// Counters only include records whose savepoint committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    /// (external_id, error) for each record that was rolled back
    pub failures: Vec<(String, String)>,
}

/// Counts from one lifecycle pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub marked_stale: usize,
    pub deleted: usize,
}

/// What started a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerType {
    ManualAll,
    ManualSingle(String),
    Scheduled,
}

impl TriggerType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ManualAll => "manual-all",
            Self::ManualSingle(_) => "manual-single",
            Self::Scheduled => "scheduled",
        }
    }

    /// Rebuilds a trigger from its stored type and optional source name
    pub fn from_db_parts(kind: &str, source: Option<String>) -> Option<Self> {
        match (kind, source) {
            ("manual-all", _) => Some(Self::ManualAll),
            ("manual-single", Some(name)) => Some(Self::ManualSingle(name)),
            ("scheduled", _) => Some(Self::Scheduled),
            _ => None,
        }
    }

    pub fn source_name(&self) -> Option<&str> {
        match self {
            Self::ManualSingle(name) => Some(name),
            _ => None,
        }
    }
}

/// Per-source line of a run log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogSource {
    pub source_id: Option<i64>,
    pub source_name: String,
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    pub error: Option<String>,
}

impl RunLogSource {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// A run log entry, as written at the end of a run
#[derive(Debug, Clone)]
pub struct RunLogEntry {
    pub trigger: TriggerType,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Failure that stopped the run before or between sources
    pub error: Option<String>,
    pub config_hash: Option<String>,
    pub sources: Vec<RunLogSource>,
}

impl RunLogEntry {
    /// A run succeeds when it had no top-level error and no source failed
    pub fn success(&self) -> bool {
        self.error.is_none() && self.sources.iter().all(RunLogSource::success)
    }
}

/// A stored run log entry
#[derive(Debug, Clone)]
pub struct RunLogRecord {
    pub id: i64,
    pub trigger: TriggerType,
    pub started_at: String,
    pub finished_at: String,
    pub success: bool,
    pub error: Option<String>,
    pub config_hash: Option<String>,
    pub jobs_found: u64,
    pub jobs_added: u64,
    pub jobs_updated: u64,
}

/// Posting counts for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePostingCount {
    pub source_name: String,
    pub active: u64,
    pub stale: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trigger_type_roundtrip() {
        for trigger in [
            TriggerType::ManualAll,
            TriggerType::ManualSingle("Clinic".to_string()),
            TriggerType::Scheduled,
        ] {
            let source = trigger.source_name().map(str::to_string);
            let parsed = TriggerType::from_db_parts(trigger.to_db_string(), source);
            assert_eq!(Some(trigger), parsed);
        }
    }

    #[test]
    fn test_trigger_type_invalid() {
        assert_eq!(TriggerType::from_db_parts("invalid", None), None);
        assert_eq!(TriggerType::from_db_parts("manual-single", None), None);
    }

    #[test]
    fn test_db_time_is_fixed_width_and_ordered() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::microseconds(1);

        let a = to_db_time(early);
        let b = to_db_time(late);
        assert_eq!(a, "2024-01-02T03:04:05.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(from_db_time(&b), Some(late));
    }

    #[test]
    fn test_run_log_success() {
        let now = Utc::now();
        let mut entry = RunLogEntry {
            trigger: TriggerType::ManualAll,
            started_at: now,
            finished_at: now,
            error: None,
            config_hash: None,
            sources: vec![RunLogSource {
                source_id: Some(1),
                source_name: "A".to_string(),
                found: 1,
                added: 1,
                updated: 0,
                error: None,
            }],
        };
        assert!(entry.success());

        entry.sources[0].error = Some("No jobs found".to_string());
        assert!(!entry.success());
    }
}
