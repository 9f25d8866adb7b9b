use url::Url;

/// Extracts the domain from a URL
///
/// Returns the lowercase host, or None for URLs without one.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use loupe::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true if both URLs have exactly the same host
///
/// Subdomains do not match their parent domain, and URLs without a host never
/// match anything.
pub fn is_same_host(a: &Url, b: &Url) -> bool {
    match (extract_domain(a), extract_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
