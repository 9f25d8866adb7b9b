//! HTTP fetcher implementation
//!
//! This module performs the single GET behind every inspected page:
//! - A random User-Agent from the configured pool on every request
//! - Manual redirect following with a hop limit
//! - Status, Content-Type and body-size checks
//! - A per-fetch timeout and immediate abort on cancellation

use std::time::Duration;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use futures::StreamExt;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::FetchError;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Knobs for a [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Deadline for the whole exchange, redirects and body included
    pub timeout: Duration,
    /// Redirect hops followed before failing with `TooManyRedirects`
    pub max_redirects: usize,
    /// Bodies larger than this fail with `ResponseTooLarge`
    pub max_body_bytes: usize,
    /// User-Agent strings picked uniformly at random per request
    pub user_agents: Vec<String>,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.inspector.fetch_timeout(),
            max_redirects: config.inspector.max_redirects,
            max_body_bytes: config.inspector.max_text_length * 2,
            user_agents: config.user_agent.pool.clone(),
        }
    }
}

/// A successfully retrieved HTML document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the body was served from, after redirects
    pub final_url: String,
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
    pub redirects: usize,
}

/// Retrieves HTML pages over HTTP
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    settings: FetchSettings,
}

impl Fetcher {
    /// Builds a fetcher and its HTTP client
    ///
    /// Automatic redirects are disabled; [`Fetcher::fetch`] follows them itself
    /// so every hop gets its own User-Agent and counts against the hop limit.
    pub fn new(settings: FetchSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(settings.timeout)
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches a URL, giving up on timeout or cancellation
    ///
    /// No retries: any failure is returned to the caller, which skips the URL.
    pub async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled {
                url: url.to_string(),
            }),
            result = tokio::time::timeout(self.settings.timeout, self.fetch_following_redirects(url)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        url: url.to_string(),
                    }),
                }
            }
        }
    }

    async fn fetch_following_redirects(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let mut redirects = 0;

        loop {
            let response = self
                .client
                .get(current.clone())
                .header(USER_AGENT, self.pick_user_agent())
                .header(ACCEPT, ACCEPT_HTML)
                .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                .send()
                .await
                .map_err(|e| classify_error(url, e))?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok());
                if let Some(location) = location {
                    if redirects >= self.settings.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            url: url.to_string(),
                        });
                    }
                    current = current.join(location).map_err(|e| FetchError::InvalidUrl {
                        url: location.to_string(),
                        message: e.to_string(),
                    })?;
                    redirects += 1;
                    tracing::trace!("Following redirect {} -> {}", url, current);
                    continue;
                }
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if !is_html(&content_type) {
                return Err(FetchError::UnsupportedContentType {
                    url: current.to_string(),
                    content_type,
                });
            }

            let limit = self.settings.max_body_bytes;
            if let Some(length) = response.content_length() {
                if length > limit as u64 {
                    return Err(FetchError::ResponseTooLarge {
                        url: current.to_string(),
                        limit,
                    });
                }
            }

            let final_url = current.to_string();
            let mut body = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| classify_error(url, e))?;
                if body.len() + chunk.len() > limit {
                    return Err(FetchError::ResponseTooLarge {
                        url: final_url,
                        limit,
                    });
                }
                body.extend_from_slice(&chunk);
            }

            return Ok(FetchedPage {
                final_url,
                status_code: status.as_u16(),
                content_type: content_type.clone(),
                body: decode_body(&body, &content_type),
                redirects,
            });
        }
    }

    fn pick_user_agent(&self) -> &str {
        self.settings
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("Mozilla/5.0")
    }
}

/// Returns true if a Content-Type header names an HTML document
fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    HTML_CONTENT_TYPES.contains(&mime.as_str())
}

/// Decodes a body to UTF-8: BOM, then the Content-Type charset, then detection
///
/// Malformed sequences become U+FFFD rather than failing the fetch.
fn decode_body(bytes: &[u8], content_type: &str) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| charset(content_type).and_then(|label| Encoding::for_label(label.as_bytes())))
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\''))
    })
}

fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
