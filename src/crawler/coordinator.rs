//! Run orchestration
//!
//! A run syncs configured sources into storage, walks every eligible source
//! in name order and reconciles what each one yields. Each source is handled
//! behind its own error boundary: a denied, unreachable or broken source is
//! recorded and the run moves on. A run log entry is written for every run,
//! including one that fails before reaching any source.

use crate::config::{Config, ExtractionConfig, SourceConfig};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::strategy::{StrategyRegistry, SITEMAP_URL_OPTION};
use crate::storage::{
    open_storage, LifecycleReport, ReconcileReport, RunLogEntry, RunLogSource, SourceRecord,
    SqliteStorage, Storage, StorageError, TriggerType,
};
use crate::url::{parse_http_url, visit_key};
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of one source within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub source_id: Option<i64>,
    pub source_name: String,
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    /// Operator-safe error summary; full detail is in the log
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Structured result of a run, returned to the caller
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Id of the run log row, when it could be written
    pub run_log_id: Option<i64>,
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    pub outcomes: Vec<SourceOutcome>,
    /// Failure that stopped the run before any source was processed
    pub error: Option<String>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.error.is_none() && self.outcomes.iter().all(SourceOutcome::success)
    }

    pub fn failed_sources(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success()).count()
    }

    fn push(&mut self, outcome: SourceOutcome) {
        self.found += outcome.found;
        self.added += outcome.added;
        self.updated += outcome.updated;
        self.outcomes.push(outcome);
    }
}

/// Drives runs, lifecycle passes and robots rechecks
pub struct Runner {
    config: Arc<Config>,
    config_hash: Option<String>,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: PageFetcher,
    registry: StrategyRegistry,
}

impl Runner {
    pub fn new(
        config: Config,
        config_hash: Option<String>,
        storage: SqliteStorage,
        fetcher: PageFetcher,
        registry: StrategyRegistry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            config_hash,
            storage: Arc::new(Mutex::new(storage)),
            fetcher,
            registry,
        }
    }

    /// Opens the configured database and builds the fetch stack
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `config_hash` - Hash of the config file, recorded on each run log entry
    pub fn from_config(config: Config, config_hash: Option<String>) -> Result<Self> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let fetcher = PageFetcher::from_config(&config)?;
        Ok(Self::new(
            config,
            config_hash,
            storage,
            fetcher,
            StrategyRegistry::with_builtins(),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    fn lock(&self) -> MutexGuard<'_, SqliteStorage> {
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes the configured sources into storage
    pub fn sync_sources(&self) -> Result<Vec<SourceRecord>> {
        let mut storage = self.lock();
        storage.sync_sources(&self.config.sources, Utc::now())?;
        Ok(storage.list_sources()?)
    }

    /// Runs every eligible source
    pub async fn run_all(&mut self, trigger: TriggerType) -> RunSummary {
        self.run(trigger).await
    }

    /// Runs one source by name
    pub async fn run_single(&mut self, name: &str) -> RunSummary {
        self.run(TriggerType::ManualSingle(name.to_string())).await
    }

    /// Runs the sources selected by `trigger` and records the run
    ///
    /// Never fails: errors end up in the summary and the run log.
    pub async fn run(&mut self, trigger: TriggerType) -> RunSummary {
        let started_at = Utc::now();
        tracing::info!("Starting {} run", trigger.to_db_string());

        let mut summary = RunSummary::default();

        match self.select_sources(&trigger) {
            Ok(sources) => {
                tracing::info!("{} eligible sources", sources.len());
                for source in &sources {
                    let outcome = self.process_source(source).await;
                    summary.push(outcome);
                }
            }
            Err(e) => {
                tracing::error!("Run failed before processing sources: {}", e);
                summary.error = Some(e.summary());
            }
        }

        let entry = RunLogEntry {
            trigger,
            started_at,
            finished_at: Utc::now(),
            error: summary.error.clone(),
            config_hash: self.config_hash.clone(),
            sources: summary
                .outcomes
                .iter()
                .map(|o| RunLogSource {
                    source_id: o.source_id,
                    source_name: o.source_name.clone(),
                    found: o.found,
                    added: o.added,
                    updated: o.updated,
                    error: o.error.clone(),
                })
                .collect(),
        };

        match self.lock().record_run(&entry) {
            Ok(id) => summary.run_log_id = Some(id),
            Err(e) => tracing::error!("Failed to write run log: {}", e),
        }

        tracing::info!(
            "Run finished: {} found, {} added, {} updated, {} failed sources",
            summary.found,
            summary.added,
            summary.updated,
            summary.failed_sources()
        );

        summary
    }

    fn select_sources(&self, trigger: &TriggerType) -> Result<Vec<SourceRecord>> {
        let sources = self.sync_sources()?;

        let Some(name) = trigger.source_name() else {
            return Ok(sources.into_iter().filter(SourceRecord::is_eligible).collect());
        };

        let source = sources
            .into_iter()
            .find(|s| s.name() == name && s.active)
            .ok_or_else(|| StorageError::SourceNotFound(name.to_string()))?;

        if source.robots_blocked {
            return Err(HarvestError::ComplianceDenied {
                url: entry_url(&source.config).to_string(),
                reason: "source is blocked by robots.txt until rechecked".to_string(),
            });
        }

        Ok(vec![source])
    }

    async fn process_source(&mut self, source: &SourceRecord) -> SourceOutcome {
        let name = source.name().to_string();
        tracing::info!("Scraping {}", name);

        let outcome = match self.scrape_source(source).await {
            Ok(report) => {
                tracing::info!(
                    "{}: {} found, {} added, {} updated",
                    name,
                    report.found,
                    report.added,
                    report.updated
                );
                SourceOutcome {
                    source_id: Some(source.id),
                    source_name: name,
                    found: report.found,
                    added: report.added,
                    updated: report.updated,
                    error: failure_summary(&report),
                }
            }
            Err(HarvestError::ExtractionEmpty { .. }) => {
                tracing::info!("{}: no jobs found", name);
                SourceOutcome {
                    source_id: Some(source.id),
                    source_name: name,
                    found: 0,
                    added: 0,
                    updated: 0,
                    error: None,
                }
            }
            Err(e) => {
                if e.is_source_abort() {
                    tracing::warn!("{}: {}", name, e);
                } else {
                    tracing::error!("{} failed: {:?}", name, e);
                }

                if let HarvestError::ComplianceDenied { url, .. } = &e {
                    if is_entry_url(&source.config, url) {
                        self.block_source(source);
                    }
                }

                SourceOutcome {
                    source_id: Some(source.id),
                    source_name: name,
                    found: 0,
                    added: 0,
                    updated: 0,
                    error: Some(e.summary()),
                }
            }
        };

        if let Err(e) = self
            .lock()
            .record_scrape_result(source.id, outcome.success(), Utc::now())
        {
            tracing::error!("Failed to record scrape result for {}: {}", outcome.source_name, e);
        }

        outcome
    }

    async fn scrape_source(&mut self, source: &SourceRecord) -> Result<ReconcileReport> {
        let records = self.registry.extract(&mut self.fetcher, &source.config).await?;
        tracing::debug!("{}: extracted {} records", source.name(), records.len());

        let report = self
            .lock()
            .reconcile_source(source.id, &records, Utc::now())
            .map_err(|e| HarvestError::SourceFatal {
                source_name: source.name().to_string(),
                message: e.to_string(),
            })?;
        Ok(report)
    }

    fn block_source(&self, source: &SourceRecord) {
        tracing::warn!(
            "Marking {} as blocked by robots.txt; run recheck once the policy changes",
            source.name()
        );
        if let Err(e) = self.lock().set_robots_blocked(source.id, true, Utc::now()) {
            tracing::error!("Failed to mark {} as blocked: {}", source.name(), e);
        }
    }

    /// Refetches robots.txt for a source's entry URL and updates its block
    ///
    /// # Returns
    ///
    /// Whether the source may now be crawled
    pub async fn recheck(&mut self, name: &str) -> Result<bool> {
        let source = self
            .sync_sources()?
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| StorageError::SourceNotFound(name.to_string()))?;

        let url = parse_http_url(entry_url(&source.config))?;
        let verdict = self.fetcher.robots().recheck(&url).await;
        let now = Utc::now();

        if verdict.allowed {
            if source.robots_blocked {
                self.lock().set_robots_blocked(source.id, false, now)?;
                tracing::info!("{} is no longer blocked by robots.txt", name);
            } else {
                tracing::info!("{} is allowed by robots.txt", name);
            }
        } else {
            tracing::warn!(
                "{} is still denied: {}\n{}",
                name,
                verdict.reason.as_deref().unwrap_or("disallowed"),
                self.fetcher.robots().diagnostics(&url)
            );
            if !source.robots_blocked {
                self.lock().set_robots_blocked(source.id, true, now)?;
            }
        }

        Ok(verdict.allowed)
    }

    /// Runs the staleness and retention pass with the configured windows
    pub fn run_lifecycle(&self, now: DateTime<Utc>) -> Result<LifecycleReport> {
        let lifecycle = &self.config.lifecycle;
        let report = self.lock().run_lifecycle(
            now,
            lifecycle.inactivity_window()?,
            lifecycle.retention_window()?,
        )?;

        tracing::info!(
            "Lifecycle pass: {} marked stale, {} deleted",
            report.marked_stale,
            report.deleted
        );
        Ok(report)
    }
}

/// First URL a source's strategy requests
fn entry_url(source: &SourceConfig) -> &str {
    match &source.extraction {
        ExtractionConfig::Custom { options, .. } => options
            .get(SITEMAP_URL_OPTION)
            .map(String::as_str)
            .unwrap_or_else(|| source.listing_url()),
        ExtractionConfig::Selectors(_) => source.listing_url(),
    }
}

fn is_entry_url(source: &SourceConfig, denied: &str) -> bool {
    match (parse_http_url(entry_url(source)), parse_http_url(denied)) {
        (Ok(entry), Ok(denied)) => visit_key(&entry) == visit_key(&denied),
        _ => false,
    }
}

fn failure_summary(report: &ReconcileReport) -> Option<String> {
    match report.failures.as_slice() {
        [] => None,
        [(external_id, message)] => Some(
            HarvestError::Upsert {
                external_id: external_id.clone(),
                message: message.clone(),
            }
            .summary(),
        ),
        failures => Some(format!("Failed to save {} jobs", failures.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderHints, SelectorConfig};
    use std::collections::BTreeMap;

    fn selectors() -> SelectorConfig {
        SelectorConfig {
            container: ".job".to_string(),
            title: ".title".to_string(),
            link: "a".to_string(),
            organization: None,
            location: None,
            job_type: None,
            salary: None,
            description: None,
            link_attribute: "href".to_string(),
            next_page: None,
            max_pages: 1,
        }
    }

    fn source(extraction: ExtractionConfig) -> SourceConfig {
        SourceConfig {
            name: "Clinic".to_string(),
            base_url: "https://clinic.example.com".to_string(),
            listing_url: Some("https://clinic.example.com/careers".to_string()),
            active: true,
            organization: None,
            default_location: None,
            default_state: None,
            bypass_robots: false,
            use_render: false,
            render_hints: RenderHints::default(),
            extraction,
        }
    }

    #[test]
    fn test_entry_url_for_selectors() {
        let src = source(ExtractionConfig::Selectors(selectors()));
        assert_eq!(entry_url(&src), "https://clinic.example.com/careers");
        assert!(is_entry_url(&src, "https://clinic.example.com/careers/"));
        assert!(!is_entry_url(&src, "https://clinic.example.com/careers?page=2"));
    }

    #[test]
    fn test_entry_url_for_sitemap() {
        let mut options = BTreeMap::new();
        options.insert(
            SITEMAP_URL_OPTION.to_string(),
            "https://clinic.example.com/sitemap.xml".to_string(),
        );
        let src = source(ExtractionConfig::Custom {
            name: "sitemap".to_string(),
            options,
        });
        assert_eq!(entry_url(&src), "https://clinic.example.com/sitemap.xml");
    }

    #[test]
    fn test_summary_totals() {
        let mut summary = RunSummary::default();
        summary.push(SourceOutcome {
            source_id: None,
            source_name: "A".to_string(),
            found: 3,
            added: 2,
            updated: 1,
            error: None,
        });
        summary.push(SourceOutcome {
            source_id: None,
            source_name: "B".to_string(),
            found: 0,
            added: 0,
            updated: 0,
            error: Some("Failed to fetch https://b.example.com/jobs".to_string()),
        });

        assert_eq!((summary.found, summary.added, summary.updated), (3, 2, 1));
        assert_eq!(summary.failed_sources(), 1);
        assert!(!summary.success());
    }

    #[test]
    fn test_failure_summary() {
        let mut report = ReconcileReport::default();
        assert_eq!(failure_summary(&report), None);

        report.failures.push(("abc".to_string(), "CHECK constraint failed".to_string()));
        assert_eq!(
            failure_summary(&report),
            Some("Failed to save job abc".to_string())
        );

        report.failures.push(("def".to_string(), "CHECK constraint failed".to_string()));
        assert_eq!(
            failure_summary(&report),
            Some("Failed to save 2 jobs".to_string())
        );
    }
}
