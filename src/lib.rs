//! job-harvest: a polite job-posting aggregator
//!
//! This crate crawls configured employer sites, honoring robots.txt and
//! crawl delays, extracts job postings with declarative CSS selectors (or a
//! registered custom strategy), and reconciles them into a SQLite catalog
//! that tracks when each posting was first and last seen.

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod text;
pub mod url;

use thiserror::Error;

/// Main error type for job-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// robots.txt disallows the URL, or the policy could not be fetched
    #[error("Crawling {url} is not permitted: {reason}")]
    ComplianceDenied { url: String, reason: String },

    /// Both the render collaborator and the direct GET failed
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// No valid records across all pages of a source
    #[error("No postings extracted for {source_name}")]
    ExtractionEmpty { source_name: String },

    /// One record's write failed and was rolled back
    #[error("Failed to save posting {external_id}: {message}")]
    Upsert {
        external_id: String,
        message: String,
    },

    /// Unexpected failure anywhere in one source's processing
    #[error("Source {source_name} failed: {message}")]
    SourceFatal {
        source_name: String,
        message: String,
    },

    #[error("Unknown extraction strategy: {0}")]
    UnknownStrategy(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns an operator-safe one-line description of the error
    ///
    /// Run summaries and run log rows carry this text instead of the full
    /// error, which can contain storage-layer or transport detail.
    pub fn summary(&self) -> String {
        match self {
            Self::ComplianceDenied { url, .. } => format!("Blocked by robots.txt: {}", url),
            Self::Fetch { url, .. } => format!("Failed to fetch {}", url),
            Self::ExtractionEmpty { .. } => "No jobs found".to_string(),
            Self::Upsert { external_id, .. } => format!("Failed to save job {}", external_id),
            Self::Config(_) | Self::UnknownStrategy(_) => {
                "Source is not configured correctly".to_string()
            }
            Self::Storage(storage::StorageError::SourceNotFound(name)) => {
                format!("Unknown or inactive source: {}", name)
            }
            _ => "Scraper failed, see logs for details".to_string(),
        }
    }

    /// Returns true for errors that end processing of the current source
    /// without being a defect in the crawler itself
    pub fn is_source_abort(&self) -> bool {
        matches!(self, Self::ComplianceDenied { .. } | Self::Fetch { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for job-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{RunSummary, Runner, SourceOutcome, TriggerType};
pub use robots::RobotsChecker;
pub use state::PostingState;
pub use storage::{SqliteStorage, Storage};
