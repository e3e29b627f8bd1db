//! Client for the dynamic-render collaborator
//!
//! The collaborator is a headless-browser service. `POST {service}/fetch`
//! takes the page URL plus optional interaction hints and answers with the
//! rendered HTML:
//!
//! ```text
//! -> {"url": "...", "wait_for": ".job", "select_actions": [{"selector": "#r", "value": "AK"}],
//!     "click_selector": null, "click_wait_for": null, "timeout": 30000}
//! <- {"success": true, "url": "...", "html": "<html>..."}
//! <- {"success": false, "error": "navigation timeout"}
//! ```

use crate::config::{RenderHints, SelectAction};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Request body sent to the collaborator
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderRequest<'a> {
    pub url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub select_actions: &'a [SelectAction],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_selector: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_wait_for: Option<&'a str>,
    /// Page load timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Response body returned by the collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct RenderResponse {
    pub success: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A page produced by the collaborator
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL reported by the browser
    pub url: Option<String>,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct RenderClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl RenderClient {
    /// Creates a client for the collaborator at `service_url`
    pub fn new(client: Client, service_url: &str, timeout: Duration) -> Result<Self, url::ParseError> {
        let base = Url::parse(service_url.trim_end_matches('/'))?;
        let endpoint = Url::parse(&format!("{}/fetch", base.as_str().trim_end_matches('/')))?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Asks the collaborator to render `url`
    ///
    /// Any failure (unreachable service, non-200, `success: false`, empty
    /// HTML, timeout) comes back as an error message for the caller to log
    /// before falling back.
    pub async fn render(&self, url: &Url, hints: &RenderHints) -> Result<RenderedPage, String> {
        let body = RenderRequest {
            url: url.as_str(),
            wait_for: hints.wait_for.as_deref(),
            select_actions: &hints.select_actions,
            click_selector: hints.click_selector.as_deref(),
            click_wait_for: hints.click_wait_for.as_deref(),
            timeout: Some(self.timeout.as_millis() as u64),
        };

        // The service enforces its own page timeout; leave it room to report
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .timeout(self.timeout + Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("render service timed out for {}", url)
                } else if e.is_connect() {
                    format!("cannot connect to render service at {}", self.endpoint)
                } else {
                    format!("render request failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("render service returned HTTP {}", status.as_u16()));
        }

        let parsed: RenderResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed render response: {}", e))?;

        if !parsed.success {
            return Err(parsed
                .error
                .unwrap_or_else(|| "render failed without an error message".to_string()));
        }

        match parsed.html {
            Some(html) if !html.trim().is_empty() => Ok(RenderedPage {
                url: parsed.url,
                html,
            }),
            _ => Err(format!("render service returned empty HTML for {}", url)),
        }
    }
}
