//! Database schema definitions
//!
//! Timestamps are RFC 3339 strings with microsecond precision and a `Z`
//! suffix, so comparing them as text orders them in time.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Configured sources plus the runtime state the runner maintains
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    config_json TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    robots_blocked INTEGER NOT NULL DEFAULT 0,
    robots_blocked_at TEXT,
    last_scraped_at TEXT,
    last_scrape_success INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Reconciled postings; identity is (source_id, external_id)
CREATE TABLE IF NOT EXISTS job_postings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL CHECK (length(title) BETWEEN 1 AND 500),
    organization TEXT CHECK (organization IS NULL OR length(organization) <= 255),
    location TEXT CHECK (location IS NULL OR length(location) <= 255),
    state TEXT CHECK (state IS NULL OR length(state) <= 50),
    description TEXT,
    job_type TEXT CHECK (job_type IS NULL OR length(job_type) <= 100),
    salary_info TEXT CHECK (salary_info IS NULL OR length(salary_info) <= 255),
    url TEXT NOT NULL CHECK (length(url) BETWEEN 1 AND 1000),
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    is_stale INTEGER NOT NULL DEFAULT 0,
    stale_since TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (first_seen_at <= last_seen_at),
    UNIQUE(source_id, external_id)
);

CREATE INDEX IF NOT EXISTS idx_postings_stale_last_seen ON job_postings(is_stale, last_seen_at);
CREATE INDEX IF NOT EXISTS idx_postings_state ON job_postings(state);

-- User bookmarks; removed together with their posting
CREATE TABLE IF NOT EXISTS saved_jobs (
    user_id INTEGER NOT NULL,
    job_id INTEGER NOT NULL REFERENCES job_postings(id) ON DELETE CASCADE,
    saved_at TEXT NOT NULL,
    PRIMARY KEY (user_id, job_id)
);

CREATE INDEX IF NOT EXISTS idx_saved_jobs_job ON saved_jobs(job_id);

-- One row per run, written even when the run fails before any source
CREATE TABLE IF NOT EXISTS run_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trigger_type TEXT NOT NULL,
    trigger_source TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    success INTEGER NOT NULL,
    error TEXT,
    config_hash TEXT,
    jobs_found INTEGER NOT NULL DEFAULT 0,
    jobs_added INTEGER NOT NULL DEFAULT 0,
    jobs_updated INTEGER NOT NULL DEFAULT 0
);

-- Per-source results of a run; source_name survives source removal
CREATE TABLE IF NOT EXISTS run_log_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_log_id INTEGER NOT NULL REFERENCES run_logs(id) ON DELETE CASCADE,
    source_id INTEGER REFERENCES sources(id) ON DELETE SET NULL,
    source_name TEXT NOT NULL,
    success INTEGER NOT NULL,
    jobs_found INTEGER NOT NULL DEFAULT 0,
    jobs_added INTEGER NOT NULL DEFAULT 0,
    jobs_updated INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_run_log_sources_run ON run_log_sources(run_log_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
