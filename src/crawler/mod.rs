//! Crawler module for fetching and extracting job postings
//!
//! This module contains the core harvesting logic, including:
//! - Compliance-gated fetching with render fallback
//! - Per-origin pacing
//! - Selector-driven extraction with pagination
//! - Custom strategy dispatch
//! - Run orchestration

mod coordinator;
mod fetcher;
mod pacing;
mod parser;
mod render;
mod strategy;

pub use coordinator::{RunSummary, Runner, SourceOutcome};
pub use fetcher::{
    build_http_client, build_page_client, FetchOptions, FetchedPage, PageFetcher, MAX_REDIRECTS,
};
pub use pacing::Pacer;
pub use parser::{
    extract_listing, extract_page, external_id_for, listing_fetch_options, CompiledSelectors,
    ExtractedPage,
};
pub use render::{RenderClient, RenderRequest, RenderResponse, RenderedPage};
pub use strategy::{
    ExtractionStrategy, RecordsFuture, SitemapStrategy, StrategyRegistry, SITEMAP_STRATEGY,
    SITEMAP_URL_OPTION, URL_PATTERN_OPTION,
};

pub use crate::storage::{ExtractedRecord, TriggerType};
