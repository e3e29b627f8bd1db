//! Compliance-gated page fetcher
//!
//! Every physical request, rendered or direct, goes through the same steps:
//! - robots.txt check for the URL's origin (skipped for bypass sources)
//! - per-origin pacing using the effective crawl delay
//! - the request itself
//!
//! When a source asks for rendering and a render service is configured the
//! service is tried first. A render failure is logged and the page is fetched
//! directly instead; only a failed direct fetch surfaces as an error.
//!
//! Direct fetches do not let reqwest follow redirects. Each `Location` hop
//! is gated and paced like a fresh request, up to `MAX_REDIRECTS` hops.

use crate::config::{Config, RenderHints};
use crate::crawler::pacing::Pacer;
use crate::crawler::render::RenderClient;
use crate::robots::RobotsChecker;
use crate::url::origin_of;
use crate::{HarvestError, Result, UrlError};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Redirect hops followed for one direct fetch
pub const MAX_REDIRECTS: usize = 5;

/// Content retrieved for one URL
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the content came from, after redirects
    pub url: Url,
    pub html: String,
    /// True when the render service produced the content
    pub rendered: bool,
}

/// Per-request options derived from the source being crawled
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub bypass_robots: bool,
    /// Render through the collaborator with these hints
    pub render: Option<RenderHints>,
}

impl FetchOptions {
    /// Plain GET, no rendering
    pub fn direct(bypass_robots: bool) -> Self {
        Self {
            bypass_robots,
            render: None,
        }
    }

    pub fn rendered(bypass_robots: bool, hints: RenderHints) -> Self {
        Self {
            bypass_robots,
            render: Some(hints),
        }
    }
}

fn client_builder(config: &Config) -> ClientBuilder {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.http.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.http.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
}

/// Builds an HTTP client with proper configuration
///
/// Used for robots.txt and the render service. Redirects follow reqwest's
/// default policy.
///
/// # Arguments
///
/// * `config` - The harvester configuration (user agent and timeouts)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    client_builder(config).build()
}

/// Builds the client for listing pages, which never follows redirects itself
pub fn build_page_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    client_builder(config).redirect(Policy::none()).build()
}

/// One direct response: either content or a hop to follow
enum Hop {
    Page(FetchedPage),
    Redirect(Url),
}

/// Fetches pages on behalf of the extraction strategies
pub struct PageFetcher {
    client: Client,
    robots: Arc<RobotsChecker>,
    render: Option<RenderClient>,
    pacer: Pacer,
}

impl PageFetcher {
    pub fn new(
        client: Client,
        robots: Arc<RobotsChecker>,
        render: Option<RenderClient>,
        pacer: Pacer,
    ) -> Self {
        Self {
            client,
            robots,
            render,
            pacer,
        }
    }

    /// Builds the clients, robots checker, render client and pacer from config
    pub fn from_config(config: &Config) -> Result<Self> {
        let shared = build_http_client(config)?;
        let client = build_page_client(config)?;
        let robots = Arc::new(RobotsChecker::from_config(shared.clone(), config));

        let render = match &config.render.service_url {
            Some(service_url) => Some(RenderClient::new(
                shared,
                service_url,
                Duration::from_secs(config.render.timeout_secs),
            )?),
            None => None,
        };

        let pacer = Pacer::new(Duration::from_millis(config.http.default_crawl_delay_ms));

        Ok(Self::new(client, robots, render, pacer))
    }

    pub fn robots(&self) -> &RobotsChecker {
        &self.robots
    }

    /// Fetches one URL
    ///
    /// # Errors
    ///
    /// * `ComplianceDenied` - robots.txt forbids the URL or could not be retrieved
    /// * `Fetch` - the direct request failed, returned a non-success status
    ///   or redirected more than `MAX_REDIRECTS` times
    pub async fn fetch(&mut self, url: &Url, options: &FetchOptions) -> Result<FetchedPage> {
        if let Some(hints) = &options.render {
            match self.render.clone() {
                Some(render) => {
                    self.gate(url, options.bypass_robots).await?;
                    match render.render(url, hints).await {
                        Ok(page) => {
                            tracing::debug!("Rendered {} ({} bytes)", url, page.html.len());
                            let final_url = page
                                .url
                                .as_deref()
                                .and_then(|u| Url::parse(u).ok())
                                .unwrap_or_else(|| url.clone());
                            return Ok(FetchedPage {
                                url: final_url,
                                html: page.html,
                                rendered: true,
                            });
                        }
                        Err(message) => {
                            tracing::warn!(
                                "Render failed for {}, falling back to direct fetch: {}",
                                url,
                                message
                            );
                        }
                    }
                }
                None => {
                    tracing::debug!("No render service configured, fetching {} directly", url);
                }
            }
        }

        let mut current = url.clone();
        for _ in 0..=MAX_REDIRECTS {
            self.gate(&current, options.bypass_robots).await?;
            match self.get(&current).await? {
                Hop::Page(page) => return Ok(page),
                Hop::Redirect(next) => {
                    tracing::debug!("{} redirects to {}", current, next);
                    current = next;
                }
            }
        }

        Err(HarvestError::Fetch {
            url: url.to_string(),
            message: format!("more than {} redirects", MAX_REDIRECTS),
        })
    }

    /// Runs the robots check and waits for the origin's turn
    async fn gate(&mut self, url: &Url, bypass: bool) -> Result<()> {
        let origin = origin_of(url).ok_or(UrlError::MissingHost)?;
        let verdict = self.robots.check(url, bypass).await;

        if !verdict.allowed {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "disallowed by robots.txt".to_string());
            tracing::warn!(
                "robots.txt denies {}: {}\n{}",
                url,
                reason,
                self.robots.diagnostics(url)
            );
            return Err(HarvestError::ComplianceDenied {
                url: url.to_string(),
                reason,
            });
        }

        self.pacer.wait_turn(&origin, verdict.crawl_delay).await;
        Ok(())
    }

    async fn get(&self, url: &Url) -> Result<Hop> {
        let fetch_error = |message: String| HarvestError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                fetch_error("request timed out".to_string())
            } else if e.is_connect() {
                fetch_error("connection failed".to_string())
            } else {
                fetch_error(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_redirection() {
            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| url.join(location).ok())
                .ok_or_else(|| {
                    fetch_error(format!("HTTP {} without a usable Location", status.as_u16()))
                })?;
            return Ok(Hop::Redirect(next));
        }

        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| fetch_error(format!("failed to read body: {}", e)))?;

        tracing::debug!("Fetched {} ({} bytes)", final_url, html.len());

        Ok(Hop::Page(FetchedPage {
            url: final_url,
            html,
            rendered: false,
        }))
    }
}
