//! Robots.txt compliance module
//!
//! `RobotsChecker` is the gate every physical fetch passes through. It
//! fetches robots.txt once per origin, caches the outcome for the life of the
//! process and answers allow/deny plus the effective crawl delay.
//!
//! # Failure policy
//!
//! | robots.txt response        | Verdict                                   |
//! |----------------------------|-------------------------------------------|
//! | 200 robots.txt content     | evaluate rules                            |
//! | 404                        | allow everything                          |
//! | other status, error, timeout | deny (or allow with `on-fetch-error = "allow"`) |
//! | 200 HTML, non-UTF-8 or no directives | same as an error            |
//!
//! A source with the bypass flag skips the gate entirely.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, RobotsOutcome};
pub use parser::{pattern_matches, RobotsRuleSet, Rule};

use crate::config::{Config, FetchErrorPolicy};
use crate::url::{origin_of, robots_url};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Result of a compliance check
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub allowed: bool,

    /// Effective crawl delay declared for this origin, if any
    pub crawl_delay: Option<Duration>,

    /// Why the URL was denied
    pub reason: Option<String>,
}

impl Verdict {
    fn allow(crawl_delay: Option<Duration>) -> Self {
        Self {
            allowed: true,
            crawl_delay,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            crawl_delay: None,
            reason: Some(reason),
        }
    }
}

/// Fetches, caches and evaluates robots.txt per origin
pub struct RobotsChecker {
    client: Client,
    agent: String,
    extra_agents: Vec<String>,
    on_fetch_error: FetchErrorPolicy,
    diagnostic_chars: usize,
    timeout: Duration,
    cache: RobotsCache,
}

impl RobotsChecker {
    /// Creates a checker
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client carrying the crawler's User-Agent
    /// * `agent` - Token matched against `User-agent` lines
    /// * `on_fetch_error` - Verdict when robots.txt cannot be retrieved
    /// * `diagnostic_chars` - Truncation length for `diagnostics`
    /// * `timeout` - Timeout for each robots.txt request
    pub fn new(
        client: Client,
        agent: impl Into<String>,
        on_fetch_error: FetchErrorPolicy,
        diagnostic_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            agent: agent.into(),
            extra_agents: Vec::new(),
            on_fetch_error,
            diagnostic_chars,
            timeout,
            cache: RobotsCache::new(),
        }
    }

    pub fn from_config(client: Client, config: &Config) -> Self {
        Self::new(
            client,
            config.user_agent.crawler_name.clone(),
            config.robots.on_fetch_error,
            config.robots.diagnostic_chars,
            Duration::from_secs(config.http.robots_timeout_secs),
        )
        .with_extra_agents(config.robots.extra_agents.clone())
    }

    /// Also honors the rules of these agent tokens; the most restrictive wins
    pub fn with_extra_agents(mut self, agents: Vec<String>) -> Self {
        self.extra_agents = agents;
        self
    }

    fn agents(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.agent.as_str()).chain(self.extra_agents.iter().map(String::as_str))
    }

    /// Checks whether `url` may be fetched
    ///
    /// With `bypass` set the check is skipped and no robots.txt is requested.
    pub async fn check(&self, url: &Url, bypass: bool) -> Verdict {
        if bypass {
            tracing::debug!("robots.txt check bypassed for {}", url);
            return Verdict::allow(None);
        }

        let Some(origin) = origin_of(url) else {
            return Verdict::deny(format!("{} has no host", url));
        };

        let robots = self.load(&origin, url).await;
        self.evaluate(&robots, url)
    }

    fn evaluate(&self, robots: &CachedRobots, url: &Url) -> Verdict {
        match &robots.outcome {
            RobotsOutcome::NotFound => Verdict::allow(None),
            RobotsOutcome::Rules(rules) => {
                let path = path_and_query(url);
                let mut delay_secs: Option<f64> = None;

                for agent in self.agents() {
                    match rules.decisive_rule(&path, agent) {
                        Some(rule) if !rule.allow => {
                            tracing::debug!(
                                "{} denied for {} by Disallow: {}",
                                url,
                                agent,
                                rule.pattern
                            );
                            return Verdict::deny(format!("Disallow: {}", rule.pattern));
                        }
                        Some(rule) => {
                            tracing::debug!("{} allowed for {} by Allow: {}", url, agent, rule.pattern)
                        }
                        None => {}
                    }
                    if let Some(secs) = rules.crawl_delay(agent) {
                        delay_secs = Some(delay_secs.map_or(secs, |d| d.max(secs)));
                    }
                }

                Verdict::allow(delay_secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok()))
            }
            RobotsOutcome::Unavailable { reason } => match self.on_fetch_error {
                FetchErrorPolicy::Deny => {
                    Verdict::deny(format!("robots.txt unavailable: {}", reason))
                }
                FetchErrorPolicy::Allow => {
                    tracing::warn!(
                        "robots.txt unavailable for {} ({}), allowing by configuration",
                        url,
                        reason
                    );
                    Verdict::allow(None)
                }
            },
        }
    }

    /// Returns the cached entry for an origin, fetching it on first use
    async fn load(&self, origin: &str, url: &Url) -> Arc<CachedRobots> {
        if let Some(cached) = self.cache.get(origin) {
            return cached;
        }

        let fetched = match robots_url(url) {
            Some(robots) => self.fetch(&robots).await,
            None => CachedRobots::new(
                RobotsOutcome::Unavailable {
                    reason: "no robots.txt location".to_string(),
                },
                String::new(),
            ),
        };
        self.cache.insert(origin, fetched)
    }

    async fn fetch(&self, robots: &Url) -> CachedRobots {
        let response = self
            .client
            .get(robots.clone())
            .timeout(self.timeout)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to fetch robots.txt from {}: {}", robots, e);
                let reason = if e.is_timeout() {
                    format!("timed out fetching {}", robots)
                } else {
                    format!("failed to fetch {}", robots)
                };
                return CachedRobots::new(
                    RobotsOutcome::Unavailable { reason },
                    format!("(Failed to fetch {}: {})", robots, e),
                );
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::info!("No robots.txt at {}, all paths allowed", robots);
            return CachedRobots::new(
                RobotsOutcome::NotFound,
                "(No robots.txt found - 404)".to_string(),
            );
        }

        if status != StatusCode::OK {
            tracing::warn!("Unexpected status {} for {}", status, robots);
            return CachedRobots::new(
                RobotsOutcome::Unavailable {
                    reason: format!("HTTP {} from {}", status.as_u16(), robots),
                },
                format!("(HTTP {} from {})", status.as_u16(), robots),
            );
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"));

        let body = match response.bytes().await {
            Ok(bytes) => String::from_utf8(bytes.to_vec()).ok(),
            Err(e) => {
                tracing::error!("Failed to read robots.txt body from {}: {}", robots, e);
                None
            }
        };
        let Some(body) = body else {
            return CachedRobots::new(
                RobotsOutcome::Unavailable {
                    reason: format!("unreadable response from {}", robots),
                },
                format!("(Unreadable response from {})", robots),
            );
        };

        let rules = RobotsRuleSet::parse(&body);
        if is_html || (!body.trim().is_empty() && !rules.has_directives()) {
            tracing::warn!("{} does not look like a robots.txt file", robots);
            return CachedRobots::new(
                RobotsOutcome::Unavailable {
                    reason: format!("malformed robots.txt at {}", robots),
                },
                body,
            );
        }

        tracing::info!("Loaded robots.txt from {}", robots);
        CachedRobots::new(RobotsOutcome::Rules(rules), body)
    }

    /// Drops the cached entry for the origin of `url`
    pub fn invalidate(&self, url: &Url) -> bool {
        match origin_of(url) {
            Some(origin) => self.cache.invalidate(&origin),
            None => false,
        }
    }

    /// Refetches robots.txt for the origin of `url` and re-evaluates it
    pub async fn recheck(&self, url: &Url) -> Verdict {
        if self.invalidate(url) {
            tracing::info!("Invalidated cached robots.txt for {}", url);
        }
        self.check(url, false).await
    }

    /// Returns the cached robots.txt for the origin of `url`, truncated
    ///
    /// Intended for logs; no request is made.
    pub fn diagnostics(&self, url: &Url) -> String {
        match origin_of(url).and_then(|origin| self.cache.get(&origin)) {
            Some(cached) => cached.diagnostic_content(self.diagnostic_chars),
            None => "(Content not cached for this origin)".to_string(),
        }
    }

    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }
}

/// Path plus `?query`, the string robots patterns are matched against
fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
