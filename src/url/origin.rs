use url::Url;

/// Returns the origin of a URL as `scheme://host[:port]`
///
/// The host is lowercased and default ports are omitted, so
/// `https://Example.com:443/a` and `https://example.com/b` share an origin
/// while `http://example.com` and `https://example.com` do not.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use job_harvest::url::origin_of;
///
/// let url = Url::parse("https://Jobs.Example.com/listings?page=2").unwrap();
/// assert_eq!(origin_of(&url), Some("https://jobs.example.com".to_string()));
/// ```
pub fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

/// Returns the robots.txt location for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    let origin = origin_of(url)?;
    Url::parse(&format!("{}/robots.txt", origin)).ok()
}
