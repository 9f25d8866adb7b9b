//! Configuration module for Loupe
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use loupe::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("loupe.toml")).unwrap();
//! println!("Fetch concurrency: {}", config.inspector.fetch_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, InspectorConfig, OutputConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
