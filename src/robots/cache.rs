//! Process-wide robots.txt cache
//!
//! Entries are keyed by origin and never expire on their own; only an
//! explicit invalidation (a recheck) removes one. Failure outcomes are cached
//! like successes so a broken origin is not hammered within a run.

use crate::robots::RobotsRuleSet;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// What fetching an origin's robots.txt produced
#[derive(Debug, Clone)]
pub enum RobotsOutcome {
    /// HTTP 200 with parsed content
    Rules(RobotsRuleSet),

    /// HTTP 404: everything is allowed
    NotFound,

    /// Any other status, a transport error or a timeout
    Unavailable { reason: String },
}

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub outcome: RobotsOutcome,

    /// Raw body for `Rules`, or a short placeholder describing the outcome
    pub raw: String,

    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(outcome: RobotsOutcome, raw: String) -> Self {
        Self {
            outcome,
            raw,
            fetched_at: Utc::now(),
        }
    }

    /// Returns the raw content truncated to `max_chars` characters
    ///
    /// Truncated content ends with a marker giving the full length.
    pub fn diagnostic_content(&self, max_chars: usize) -> String {
        if self.raw.is_empty() {
            return "(No robots.txt content available)".to_string();
        }

        let total = self.raw.chars().count();
        if total <= max_chars {
            return self.raw.clone();
        }

        let head: String = self.raw.chars().take(max_chars).collect();
        format!("{}\n... (truncated, {} total chars)", head, total)
    }
}

/// Origin-keyed cache shared by every check in the process
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: RwLock<HashMap<String, Arc<CachedRobots>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, origin: &str) -> Option<Arc<CachedRobots>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(origin).cloned()
    }

    /// Stores an entry, keeping an existing one if another check got there first
    pub fn insert(&self, origin: &str, robots: CachedRobots) -> Arc<CachedRobots> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(robots))
            .clone()
    }

    /// Removes an origin's entry; returns true if one was cached
    pub fn invalidate(&self, origin: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(origin).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
