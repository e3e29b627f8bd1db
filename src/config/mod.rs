//! Configuration module for job-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Sources are declared as `[[source]]` tables and carry their extraction
//! strategy under `[source.extraction]`.
//!
//! # Example
//!
//! ```no_run
//! use job_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("{} sources configured", config.sources.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ExtractionConfig, FetchErrorPolicy, HttpConfig, LifecycleConfig, OutputConfig,
    RenderConfig, RenderHints, RobotsConfig, SelectAction, SelectorConfig, SourceConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
