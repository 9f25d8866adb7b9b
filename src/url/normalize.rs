use url::Url;

/// Exact-match tracking query parameters removed during normalization
const TRACKING_PARAMS: &[&str] = &["ref", "fbclid"];

/// Prefix shared by every campaign-tracking parameter
const TRACKING_PREFIX: &str = "utm_";

/// Normalizes a URL into the canonical string used for deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; if that fails, return the input unchanged
/// 2. Remove the fragment
/// 3. Remove tracking query parameters (`utm_*`, `ref`, `fbclid`)
/// 4. Sort the remaining query parameters by key (stable for repeated keys)
/// 5. Drop the query string entirely if nothing remains
/// 6. Strip trailing slashes from the serialized form
///
/// Normalization is best-effort and never fails. It is idempotent:
/// `normalize_url(&normalize_url(u)) == normalize_url(u)`.
///
/// # Examples
///
/// ```
/// use loupe::url::normalize_url;
///
/// let url = normalize_url("https://example.com/page/?b=2&utm_source=x&a=1#top");
/// assert_eq!(url, "https://example.com/page/?a=1&b=2");
/// assert_eq!(normalize_url("not a url"), "not a url");
/// ```
pub fn normalize_url(url_str: &str) -> String {
    let mut url = match Url::parse(url_str) {
        Ok(url) => url,
        Err(_) => return url_str.to_string(),
    };

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    let has_host = url.host().is_some();
    let serialized = String::from(url);
    if !has_host || serialized.contains('?') {
        return serialized;
    }

    serialized.trim_end_matches('/').to_string()
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with(TRACKING_PREFIX)
}
