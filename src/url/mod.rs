//! URL handling module
//!
//! This module provides origin extraction (the key for robots.txt caching and
//! crawl-delay pacing), link resolution against the fetching page, and the
//! normalization used by the pagination cycle guard.

mod normalize;
mod origin;

// Re-export main functions
pub use normalize::{parse_http_url, resolve_link, visit_key};
pub use origin::{origin_of, robots_url};
