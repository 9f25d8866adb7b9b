//! HTML content extraction
//!
//! This module turns a fetched document into what a research step can use:
//! - The page title
//! - Visible body text with navigation, ads and consent banners removed
//! - Same-host links, normalized for deduplication

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{node::Node, ElementRef, Html, Selector};
use url::Url;

use crate::url::{is_same_host, normalize_url};

/// Elements whose whole subtree is dropped before text extraction
const BLOCKED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "nav", "header", "footer", "aside",
];

/// ARIA landmark roles treated like their blocked element equivalents
const BLOCKED_ROLES: &[&str] = &["navigation", "banner", "complementary", "contentinfo"];

/// Substrings of a class or id that mark an element as boilerplate
const BLOCKED_MARKERS: &[&str] = &[
    "cookie", "privacy", "gdpr", "consent", "advert", "sponsor", "menu", "navbar", "sidebar",
];

/// Elements that separate words when their text is flattened
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption", "figure",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre", "section", "table",
    "td", "th", "tr", "ul",
];

/// Legal and consent phrases; the sentence containing one is removed
const BOILERPLATE_PHRASES: &[&str] = &[
    r"we use cookies",
    r"this (?:site|website) uses cookies",
    r"accept (?:all )?cookies",
    r"cookie (?:policy|settings|preferences)",
    r"privacy policy",
    r"terms of (?:use|service)",
    r"all rights reserved",
    r"by continuing to (?:use|browse)",
    r"manage (?:your )?preferences",
    r"(?:subscribe to|sign up for) our newsletter",
];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    /// The page title, empty if the document has none
    pub title: String,

    /// Cleaned body text, whitespace collapsed and truncated
    pub text: String,

    /// Normalized same-host links in document order, without duplicates
    pub links: Vec<String>,
}

impl ExtractedPage {
    /// Length of the extracted text in characters
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.text.is_empty() && self.links.is_empty()
    }
}

/// Extracts title, text and same-host links from an HTML document
///
/// A base URL that cannot be parsed yields an empty page; that is a "no page"
/// result for the caller, not an error.
///
/// # Example
///
/// ```
/// use loupe::crawler::extract_page;
///
/// let html = r#"<html><head><title>Test</title></head>
///     <body><nav>Home</nav><p>Hello world.</p><a href="/next">Next</a></body></html>"#;
/// let page = extract_page(html, "https://example.com/", 1000);
/// assert_eq!(page.title, "Test");
/// assert_eq!(page.text, "Hello world. Next");
/// assert_eq!(page.links, vec!["https://example.com/next".to_string()]);
/// ```
pub fn extract_page(html: &str, base_url: &str, max_text_length: usize) -> ExtractedPage {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return ExtractedPage::default(),
    };

    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let text = extract_text(&document, max_text_length);
    let links = extract_links(&document, &base);

    ExtractedPage { title, text, links }
}

/// Extracts the page title, falling back to the first heading
fn extract_title(document: &Html) -> String {
    for selector in ["title", "h1"] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        let title = document
            .select(&selector)
            .next()
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .unwrap_or_default();
        if !title.is_empty() {
            return title;
        }
    }
    String::new()
}

fn extract_text(document: &Html, max_text_length: usize) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let raw = visible_text(root);
    let collapsed = collapse_whitespace(&raw);
    let cleaned = collapse_whitespace(&boilerplate_regex().replace_all(&collapsed, " "));
    truncate_chars(&cleaned, max_text_length)
}

enum Step<'a> {
    Enter(ElementRef<'a>),
    Text(&'a str),
    Space,
}

/// Flattens the text under `root`, skipping blocked subtrees
///
/// Iterative so deeply nested documents cannot exhaust the stack.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Enter(root)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Text(text) => out.push_str(text),
            Step::Space => out.push(' '),
            Step::Enter(element) => {
                if BLOCK_TAGS.contains(&element.value().name()) {
                    out.push(' ');
                    stack.push(Step::Space);
                }
                for child in element.children().rev() {
                    match child.value() {
                        Node::Text(text) => stack.push(Step::Text(&**text)),
                        Node::Element(_) => {
                            if let Some(child) = ElementRef::wrap(child) {
                                if !is_blocked(&child) {
                                    stack.push(Step::Enter(child));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    out
}

/// Returns true if the element is navigation, advertising or consent chrome
fn is_blocked(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if BLOCKED_TAGS.contains(&value.name()) {
        return true;
    }

    if let Some(role) = value.attr("role") {
        if BLOCKED_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()) {
            return true;
        }
    }

    let id = value.attr("id").unwrap_or("");
    let class = value.attr("class").unwrap_or("");
    id.split_whitespace()
        .chain(class.split_whitespace())
        .any(is_blocked_token)
}

fn is_blocked_token(token: &str) -> bool {
    let token = token.to_ascii_lowercase();
    if BLOCKED_MARKERS.iter().any(|m| token.contains(m)) {
        return true;
    }
    // "ad" alone is too short for substring matching ("header", "loading")
    token == "ad"
        || token == "ads"
        || token.starts_with("ad-")
        || token.starts_with("ad_")
        || token.starts_with("ads-")
        || token.starts_with("ads_")
}

fn boilerplate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(
            r"(?i)[^.!?]*?\b(?:{})\b[^.!?]*[.!?]?",
            BOILERPLATE_PHRASES.join("|")
        );
        Regex::new(&pattern).expect("boilerplate pattern is valid")
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Extracts normalized links that stay on the base URL's host
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(absolute) = resolve_link(href, base_url) else {
            continue;
        };
        if !is_same_host(&absolute, base_url) {
            continue;
        }

        let normalized = normalize_url(absolute.as_str());
        if seen.insert(normalized.clone()) {
            links.push(normalized);
        }
    }

    links
}

/// Resolves a link href to an absolute HTTP(S) URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: schemes
/// - fragment-only links
/// - invalid URLs
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
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

    let absolute = base_url.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute)
    } else {
        None
    }
}
