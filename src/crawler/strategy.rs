//! Extraction strategy dispatch
//!
//! A source either declares CSS selectors, handled by the extraction engine in
//! `parser`, or names a custom strategy registered in a `StrategyRegistry`.
//! Both paths run through the same compliance-gated `PageFetcher`.
//!
//! The built-in `sitemap` strategy reads job URLs out of an XML sitemap and
//! derives each record from the URL itself:
//!
//! ```text
//! /kotzebue-ak/customer-service-agent/873E0B7E718D43CE8180C9246164D91E/job/
//!  location      title                 external id
//! ```

use crate::config::{ExtractionConfig, SourceConfig};
use crate::crawler::fetcher::{FetchOptions, PageFetcher};
use crate::crawler::parser::{external_id_for, extract_listing};
use crate::storage::ExtractedRecord;
use crate::text::normalize_state;
use crate::url::{parse_http_url, resolve_link, visit_key};
use crate::{ConfigError, HarvestError, Result};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;
use url::Url;

/// Future returned by a custom strategy
pub type RecordsFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<ExtractedRecord>>> + 'a>>;

/// Fully custom extraction logic for one kind of site
pub trait ExtractionStrategy {
    /// Produces candidate records for `source`
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Gated fetcher; every request must go through it
    /// * `source` - The source being crawled
    /// * `options` - Free-form options from the source's `extraction` table
    fn extract<'a>(
        &'a self,
        fetcher: &'a mut PageFetcher,
        source: &'a SourceConfig,
        options: &'a BTreeMap<String, String>,
    ) -> RecordsFuture<'a>;
}

/// Custom strategies by name
pub struct StrategyRegistry {
    strategies: HashMap<String, Box<dyn ExtractionStrategy>>,
}

impl StrategyRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// A registry holding the built-in strategies
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SITEMAP_STRATEGY, Box::new(SitemapStrategy));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.insert(name.into(), strategy);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Runs the strategy configured for `source`
    ///
    /// # Errors
    ///
    /// * `UnknownStrategy` - the source names a strategy that is not registered
    /// * `ExtractionEmpty` - no valid records across all pages
    /// * anything the fetch path raises (`ComplianceDenied`, `Fetch`)
    pub async fn extract(
        &self,
        fetcher: &mut PageFetcher,
        source: &SourceConfig,
    ) -> Result<Vec<ExtractedRecord>> {
        let records = match &source.extraction {
            ExtractionConfig::Selectors(selectors) => {
                extract_listing(fetcher, source, selectors).await?
            }
            ExtractionConfig::Custom { name, options } => {
                let strategy = self
                    .strategies
                    .get(name)
                    .ok_or_else(|| HarvestError::UnknownStrategy(name.clone()))?;
                strategy.extract(fetcher, source, options).await?
            }
        };

        if records.is_empty() {
            return Err(HarvestError::ExtractionEmpty {
                source_name: source.name.clone(),
            });
        }

        Ok(records)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

pub const SITEMAP_STRATEGY: &str = "sitemap";

/// Option naming the sitemap (or sitemap index) to start from
pub const SITEMAP_URL_OPTION: &str = "sitemap-url";

/// Option holding a case-insensitive regex job URLs must match
pub const URL_PATTERN_OPTION: &str = "url-pattern";

const MAX_INDEX_DEPTH: u32 = 3;

static SITEMAP_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:\w+:)?sitemapindex[\s>]").unwrap());

static LOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(?:\w+:)?loc>\s*(.*?)\s*</(?:\w+:)?loc>").unwrap());

static CITY_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9-]+)-([a-z]{2})$").unwrap());

static ID_LIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F-]+$").unwrap());

static HEX_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{20,}$").unwrap());

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

/// Derives postings from the URLs listed in an XML sitemap
#[derive(Debug, Default)]
pub struct SitemapStrategy;

impl ExtractionStrategy for SitemapStrategy {
    fn extract<'a>(
        &'a self,
        fetcher: &'a mut PageFetcher,
        source: &'a SourceConfig,
        options: &'a BTreeMap<String, String>,
    ) -> RecordsFuture<'a> {
        Box::pin(extract_sitemap(fetcher, source, options))
    }
}

async fn extract_sitemap(
    fetcher: &mut PageFetcher,
    source: &SourceConfig,
    options: &BTreeMap<String, String>,
) -> Result<Vec<ExtractedRecord>> {
    let sitemap_url = options.get(SITEMAP_URL_OPTION).ok_or_else(|| {
        ConfigError::Validation(format!(
            "source '{}' uses the sitemap strategy without a {} option",
            source.name, SITEMAP_URL_OPTION
        ))
    })?;
    let sitemap_url = parse_http_url(sitemap_url)?;

    let pattern = options
        .get(URL_PATTERN_OPTION)
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::Validation(format!("invalid url-pattern '{}': {}", p, e)))
        })
        .transpose()?;

    let job_urls = collect_sitemap_urls(fetcher, source, sitemap_url).await?;
    let total = job_urls.len();

    let mut seen = HashSet::new();
    let records: Vec<ExtractedRecord> = job_urls
        .into_iter()
        .filter(|u| pattern.as_ref().map_or(true, |p| p.is_match(u)))
        .filter(|u| seen.insert(u.clone()))
        .filter_map(|u| {
            let record = record_from_url(&u, source);
            if record.is_none() {
                tracing::debug!("Could not derive a posting from {}", u);
            }
            record
        })
        .collect();

    tracing::info!(
        "{}: {} of {} sitemap URLs became postings",
        source.name,
        records.len(),
        total
    );

    Ok(records)
}

/// Fetches the sitemap and any child sitemaps, returning page URLs
///
/// A failed child sitemap is skipped; a failed root propagates.
async fn collect_sitemap_urls(
    fetcher: &mut PageFetcher,
    source: &SourceConfig,
    root: Url,
) -> Result<Vec<String>> {
    let options = FetchOptions::direct(source.bypass_robots);
    let mut queue = VecDeque::from([(root, 0u32)]);
    let mut visited = HashSet::new();
    let mut urls = Vec::new();

    while let Some((url, depth)) = queue.pop_front() {
        if !visited.insert(visit_key(&url)) {
            continue;
        }

        let page = match fetcher.fetch(&url, &options).await {
            Ok(page) => page,
            Err(e) if depth > 0 => {
                tracing::warn!("Skipping child sitemap {}: {}", url, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let (is_index, locs) = parse_sitemap(&page.html);
        if !is_index {
            urls.extend(locs);
            continue;
        }

        if depth >= MAX_INDEX_DEPTH {
            tracing::warn!("Sitemap index nesting limit reached at {}", url);
            continue;
        }

        tracing::debug!("Sitemap index {} lists {} child sitemaps", url, locs.len());
        queue.extend(
            locs.iter()
                .filter_map(|loc| resolve_link(loc, &page.url))
                .map(|child| (child, depth + 1)),
        );
    }

    Ok(urls)
}

/// Returns whether `xml` is a sitemap index, and its `<loc>` values
fn parse_sitemap(xml: &str) -> (bool, Vec<String>) {
    let is_index = SITEMAP_INDEX.is_match(xml);
    let locs = LOC
        .captures_iter(xml)
        .map(|caps| unescape_xml(&caps[1]))
        .filter(|loc| !loc.is_empty())
        .collect();
    (is_index, locs)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Builds a record from the structure of a job URL
///
/// Returns None when the URL has no usable title segment.
fn record_from_url(job_url: &str, source: &SourceConfig) -> Option<ExtractedRecord> {
    let url = parse_http_url(job_url).ok()?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let title_slug = segments.get(1)?;
    if ID_LIKE.is_match(title_slug) {
        return None;
    }
    let title = title_case(title_slug);

    let (city, state) = segments
        .first()
        .and_then(|first| city_and_state(first))
        .map_or((None, None), |(city, state)| (Some(city), Some(state)));

    let location = match (&city, &state) {
        (Some(city), Some(state)) => Some(format!("{}, {}", city, state)),
        _ => source.default_location.clone(),
    };

    let state = state.or_else(|| source.default_state.as_deref().and_then(normalize_state));

    let external_id = segments
        .iter()
        .filter(|seg| **seg != "job")
        .find(|seg| HEX_ID.is_match(seg) || UUID.is_match(seg))
        .map(|seg| seg.to_string())
        .unwrap_or_else(|| external_id_for(url.as_str()));

    Some(ExtractedRecord {
        external_id,
        title,
        url: url.to_string(),
        organization: Some(
            source
                .organization
                .clone()
                .unwrap_or_else(|| source.name.clone()),
        ),
        location,
        state,
        description: None,
        job_type: None,
        salary_info: None,
    })
}

/// Splits `kotzebue-ak` into ("Kotzebue", "AK")
fn city_and_state(segment: &str) -> Option<(String, String)> {
    let lower = segment.to_lowercase();
    let caps = CITY_STATE.captures(&lower)?;
    let state = normalize_state(&caps[2])?;
    Some((title_case(&caps[1]), state))
}

/// `customer-service-agent` -> `Customer Service Agent`
fn title_case(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
