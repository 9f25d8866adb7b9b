//! URL handling module for Loupe
//!
//! This module provides URL normalization for per-session deduplication and
//! host helpers for the same-domain link restriction.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, is_same_host};
pub use normalize::normalize_url;
