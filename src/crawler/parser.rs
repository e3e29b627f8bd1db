//! Selector-driven extraction engine
//!
//! A source's `SelectorConfig` describes one listing layout:
//! - `container` matches one element per posting
//! - `title` and `link` are required inside each container
//! - organization, location, job type, salary and description are optional
//! - `next-page` points at the following listing page, up to `max-pages`
//!
//! Page parsing is synchronous; only the fetches between pages suspend.

use crate::config::{RenderHints, SelectorConfig, SourceConfig};
use crate::crawler::fetcher::{FetchOptions, PageFetcher};
use crate::storage::ExtractedRecord;
use crate::text::{
    clean_text, extract_salary, extract_state_from_location, normalize_job_type, normalize_state,
};
use crate::url::{parse_http_url, resolve_link, visit_key};
use crate::{ConfigError, Result};
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use url::Url;

/// Selectors of one `SelectorConfig`, parsed once per source
#[derive(Debug)]
pub struct CompiledSelectors {
    container: Selector,
    title: Selector,
    link: Selector,
    organization: Option<Selector>,
    location: Option<Selector>,
    job_type: Option<Selector>,
    salary: Option<Selector>,
    description: Option<Selector>,
    next_page: Option<Selector>,
    link_attribute: String,
}

impl CompiledSelectors {
    pub fn compile(config: &SelectorConfig) -> std::result::Result<Self, ConfigError> {
        let optional = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();

        Ok(Self {
            container: parse_selector(&config.container)?,
            title: parse_selector(&config.title)?,
            link: parse_selector(&config.link)?,
            organization: optional(&config.organization)?,
            location: optional(&config.location)?,
            job_type: optional(&config.job_type)?,
            salary: optional(&config.salary)?,
            description: optional(&config.description)?,
            next_page: optional(&config.next_page)?,
            link_attribute: config.link_attribute.clone(),
        })
    }
}

fn parse_selector(selector: &str) -> std::result::Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Records and continuation found on one listing page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub records: Vec<ExtractedRecord>,
    pub next_page: Option<Url>,
}

/// Source-scoped identity of a posting
///
/// First 32 hex characters of the SHA-256 of the absolute posting URL.
pub fn external_id_for(url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    digest[..32].to_string()
}

/// Extracts postings and the next-page link from one listing page
///
/// # Arguments
///
/// * `html` - Page content
/// * `page_url` - URL the content was fetched from, used to resolve relative links
/// * `selectors` - Compiled selector set for the source
/// * `source` - Source configuration, for fallback organization/location/state
pub fn extract_page(
    html: &str,
    page_url: &Url,
    selectors: &CompiledSelectors,
    source: &SourceConfig,
) -> ExtractedPage {
    let document = Html::parse_document(html);

    let records = document
        .select(&selectors.container)
        .filter_map(|block| extract_record(block, page_url, selectors, source))
        .collect();

    let next_page = selectors.next_page.as_ref().and_then(|selector| {
        document
            .select(selector)
            .find_map(|el| el.value().attr("href"))
            .and_then(|href| resolve_link(href, page_url))
    });

    ExtractedPage { records, next_page }
}

fn extract_record(
    block: ElementRef<'_>,
    page_url: &Url,
    selectors: &CompiledSelectors,
    source: &SourceConfig,
) -> Option<ExtractedRecord> {
    let Some(title) = select_text(block, &selectors.title) else {
        tracing::debug!("Skipping posting on {} with no title", page_url);
        return None;
    };

    let Some(url) = select_link(block, selectors, page_url) else {
        tracing::debug!("Skipping posting '{}' on {} with no link", title, page_url);
        return None;
    };

    let organization = selectors
        .organization
        .as_ref()
        .and_then(|s| select_text(block, s))
        .or_else(|| source.organization.clone());

    let location = selectors
        .location
        .as_ref()
        .and_then(|s| select_text(block, s))
        .or_else(|| source.default_location.clone());

    let state = location
        .as_deref()
        .and_then(extract_state_from_location)
        .or_else(|| source.default_state.as_deref().and_then(normalize_state));

    let job_type = selectors
        .job_type
        .as_ref()
        .and_then(|s| select_text(block, s))
        .and_then(|t| normalize_job_type(&t));

    let salary_info = selectors
        .salary
        .as_ref()
        .and_then(|s| select_text(block, s))
        .map(|raw| extract_salary(&raw).unwrap_or(raw));

    let description = selectors
        .description
        .as_ref()
        .and_then(|s| select_text(block, s));

    Some(ExtractedRecord {
        external_id: external_id_for(url.as_str()),
        title,
        url: url.to_string(),
        organization,
        location,
        state,
        description,
        job_type,
        salary_info,
    })
}

/// Cleaned text of the first match inside `block`
fn select_text(block: ElementRef<'_>, selector: &Selector) -> Option<String> {
    block
        .select(selector)
        .find_map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
}

/// Link attribute of the first match inside `block`, or of the block itself
/// when the container is the link
fn select_link(block: ElementRef<'_>, selectors: &CompiledSelectors, page_url: &Url) -> Option<Url> {
    let attr = selectors.link_attribute.as_str();

    block
        .select(&selectors.link)
        .find_map(|el| el.value().attr(attr))
        .or_else(|| {
            selectors
                .link
                .matches(&block)
                .then(|| block.value().attr(attr))
                .flatten()
        })
        .and_then(|href| resolve_link(href, page_url))
}

/// Fetch options for a selector-driven source
///
/// Rendering waits for the container selector unless the source names its
/// own wait target.
pub fn listing_fetch_options(source: &SourceConfig, config: &SelectorConfig) -> FetchOptions {
    if !source.use_render {
        return FetchOptions::direct(source.bypass_robots);
    }

    let mut hints: RenderHints = source.render_hints.clone();
    if hints.wait_for.is_none() {
        hints.wait_for = Some(config.container.clone());
    }
    FetchOptions::rendered(source.bypass_robots, hints)
}

/// Walks a source's listing pages and collects every valid record
///
/// Stops after `max-pages` pages, on a page with no valid records, when no
/// next-page link is found, or when the next link was already visited.
pub async fn extract_listing(
    fetcher: &mut PageFetcher,
    source: &SourceConfig,
    config: &SelectorConfig,
) -> Result<Vec<ExtractedRecord>> {
    let selectors = CompiledSelectors::compile(config)?;
    let options = listing_fetch_options(source, config);

    let mut url = parse_http_url(source.listing_url())?;
    let mut visited: HashSet<String> = HashSet::new();
    let mut records = Vec::new();

    for page_number in 1..=config.max_pages {
        visited.insert(visit_key(&url));

        let page = fetcher.fetch(&url, &options).await?;
        let extracted = extract_page(&page.html, &page.url, &selectors, source);

        tracing::debug!(
            "{}: page {} yielded {} postings",
            source.name,
            page_number,
            extracted.records.len()
        );

        if extracted.records.is_empty() {
            break;
        }
        records.extend(extracted.records);

        match extracted.next_page {
            Some(next) if visited.contains(&visit_key(&next)) => {
                tracing::debug!("{}: next page {} already visited", source.name, next);
                break;
            }
            Some(next) => url = next,
            None => break,
        }
    }

    Ok(records)
}
