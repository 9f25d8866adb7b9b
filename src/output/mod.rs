//! Output module for reporting on run directories
//!
//! This module reads what a run has persisted and renders it for humans. It
//! never writes to the run directory.

pub mod stats;

pub use stats::{load_run_statistics, print_run_statistics, RunStatistics};
