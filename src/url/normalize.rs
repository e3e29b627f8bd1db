use crate::{UrlError, UrlResult};
use url::Url;

/// Parses a URL and requires an HTTP(S) scheme and a host
///
/// # Examples
///
/// ```
/// use job_harvest::url::parse_http_url;
///
/// assert!(parse_http_url("https://example.com/jobs").is_ok());
/// assert!(parse_http_url("ftp://example.com/jobs").is_err());
/// ```
pub fn parse_http_url(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Resolves a link href against the URL of the page it was found on
///
/// Absolute, root-relative, same-level (`job/1`, `./job/1`) and
/// parent-relative (`../job/1`) forms are supported.
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, page_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    match page_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute)
        }
        _ => None,
    }
}

/// Builds the key used to detect revisits of the same listing page
///
/// Two URLs that differ only in host case, fragment, a trailing slash,
/// repeated slashes or query parameter order map to the same key.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use job_harvest::url::visit_key;
///
/// let a = Url::parse("https://Example.com/jobs/?b=2&a=1#top").unwrap();
/// let b = Url::parse("https://example.com/jobs?a=1&b=2").unwrap();
/// assert_eq!(visit_key(&a), visit_key(&b));
/// ```
pub fn visit_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);

    let path = normalize_path(url.path());
    key.set_path(&path);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.sort();

        if params.is_empty() {
            key.set_query(None);
        } else {
            key.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    key.to_string()
}

/// Collapses empty segments and removes the trailing slash (except for root)
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}
