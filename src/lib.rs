//! Loupe: a concurrent, depth-bounded page inspector for research runs
//!
//! This crate retrieves web pages for a set of seed locations under a global
//! concurrency budget, extracts clean text and same-site links, optionally
//! expands one level deeper, and durably records every inspected page in a
//! crash-consistent run directory.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Loupe operations
#[derive(Debug, Error)]
pub enum LoupeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Reasons a single page retrieval can fail
///
/// Every variant is transient from the session's point of view: the URL is
/// skipped and never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Unsupported content type '{content_type}' for {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Response from {url} exceeded {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Fetch cancelled for {url}")]
    Cancelled { url: String },

    #[error("Too many redirects from {url}")]
    TooManyRedirects { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    /// Returns true if the failure was caused by the cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias for Loupe operations
pub type Result<T> = std::result::Result<T, LoupeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Governor, InspectOutcome, Inspector, SessionReport, SkipReason};
pub use state::TaskState;
pub use storage::{PageRecord, QuestionNode, RunMeta, RunStatus, RunStore};
pub use url::normalize_url;
