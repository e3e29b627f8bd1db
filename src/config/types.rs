use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure for job-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Builds the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// HTTP client behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Total timeout for one page request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for robots.txt requests (seconds)
    #[serde(default = "default_robots_timeout")]
    pub robots_timeout_secs: u64,

    /// Spacing between requests to one origin when robots.txt declares no crawl-delay (milliseconds)
    #[serde(default = "default_crawl_delay_ms")]
    pub default_crawl_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            robots_timeout_secs: default_robots_timeout(),
            default_crawl_delay_ms: default_crawl_delay_ms(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_robots_timeout() -> u64 {
    10
}

fn default_crawl_delay_ms() -> u64 {
    1000
}

/// Dynamic-render collaborator settings
///
/// Rendering is disabled when `service-url` is absent; sources asking for
/// rendering then go straight to a direct fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenderConfig {
    #[serde(default)]
    pub service_url: Option<String>,

    /// Timeout passed to the collaborator and applied to the request (seconds)
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            timeout_secs: default_render_timeout(),
        }
    }
}

fn default_render_timeout() -> u64 {
    60
}

/// What to do when robots.txt cannot be retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorPolicy {
    #[default]
    Deny,
    Allow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RobotsConfig {
    #[serde(default)]
    pub on_fetch_error: FetchErrorPolicy,

    /// Maximum robots.txt characters kept for diagnostics
    #[serde(default = "default_diagnostic_chars")]
    pub diagnostic_chars: usize,

    /// Further agent tokens whose rules are honored alongside the crawler's;
    /// a URL any of them disallows is denied
    #[serde(default = "default_extra_agents")]
    pub extra_agents: Vec<String>,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            on_fetch_error: FetchErrorPolicy::Deny,
            diagnostic_chars: default_diagnostic_chars(),
            extra_agents: default_extra_agents(),
        }
    }
}

fn default_extra_agents() -> Vec<String> {
    vec!["Mozilla".to_string()]
}

fn default_diagnostic_chars() -> usize {
    2000
}

/// Staleness and retention windows for the lifecycle pass
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LifecycleConfig {
    /// A posting not seen for this long is marked stale
    #[serde(default = "default_inactivity_hours")]
    pub inactivity_hours: u64,

    /// A posting stale for this long is deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

/// Longest accepted inactivity window, one year
pub const MAX_INACTIVITY_HOURS: u64 = 24 * 366;

/// Longest accepted retention window, ten years
pub const MAX_RETENTION_DAYS: u64 = 3660;

impl LifecycleConfig {
    pub fn inactivity_window(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.inactivity_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "inactivity-hours {} is out of range",
                    self.inactivity_hours
                ))
            })
    }

    pub fn retention_window(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.retention_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "retention-days {} is out of range",
                    self.retention_days
                ))
            })
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            inactivity_hours: default_inactivity_hours(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_inactivity_hours() -> u64 {
    24
}

fn default_retention_days() -> u64 {
    7
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// One configured target site
///
/// Serialized to JSON when synced into storage, so the stored copy always
/// reflects the file the run was started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    pub name: String,

    pub base_url: String,

    /// First listing page; defaults to `base-url`
    #[serde(default)]
    pub listing_url: Option<String>,

    #[serde(default = "default_true")]
    pub active: bool,

    /// Organization used when the page does not name one
    #[serde(default)]
    pub organization: Option<String>,

    #[serde(default)]
    pub default_location: Option<String>,

    #[serde(default)]
    pub default_state: Option<String>,

    /// Skip the robots.txt gate entirely
    #[serde(default)]
    pub bypass_robots: bool,

    /// Fetch through the render collaborator first
    #[serde(default)]
    pub use_render: bool,

    #[serde(default)]
    pub render_hints: RenderHints,

    pub extraction: ExtractionConfig,
}

impl SourceConfig {
    pub fn listing_url(&self) -> &str {
        self.listing_url.as_deref().unwrap_or(&self.base_url)
    }
}

fn default_true() -> bool {
    true
}

/// How postings are pulled out of a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExtractionConfig {
    /// Declarative CSS selectors applied to listing pages
    Selectors(SelectorConfig),

    /// A strategy registered in code under `name`
    Custom {
        name: String,
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
}

/// CSS selectors describing one listing page layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectorConfig {
    /// Matches one element per posting
    pub container: String,
    pub title: String,
    pub link: String,

    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,

    /// Attribute of the link element holding the posting URL
    #[serde(default = "default_link_attribute")]
    pub link_attribute: String,

    #[serde(default)]
    pub next_page: Option<String>,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_link_attribute() -> String {
    "href".to_string()
}

fn default_max_pages() -> u32 {
    10
}

/// Instructions forwarded to the render collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenderHints {
    /// Selector to wait for before capturing the page
    #[serde(default)]
    pub wait_for: Option<String>,

    #[serde(default)]
    pub select_actions: Vec<SelectAction>,

    #[serde(default)]
    pub click_selector: Option<String>,

    #[serde(default)]
    pub click_wait_for: Option<String>,
}

/// Sets a `<select>` element to a value before capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectAction {
    pub selector: String,
    pub value: String,
}
