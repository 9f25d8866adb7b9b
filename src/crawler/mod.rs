//! Crawler module for page inspection
//!
//! This module contains the core inspection logic, including:
//! - HTTP fetching with timeouts, redirect limits and cancellation
//! - HTML text and link extraction
//! - Global admission control for concurrent work
//! - Per-question session coordination

mod coordinator;
mod fetcher;
mod governor;
mod parser;

pub use coordinator::{InspectOutcome, Inspector, ProgressFn, SessionReport, SkipReason};
pub use fetcher::{FetchSettings, FetchedPage, Fetcher};
pub use governor::{Governor, GovernorPermit};
pub use parser::{extract_page, ExtractedPage};

pub use tokio_util::sync::CancellationToken;
