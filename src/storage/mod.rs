//! Storage module for persisting research runs
//!
//! This module handles everything written to disk during a run:
//! - The data model shared with the upstream question generator and the
//!   downstream synthesis step
//! - The atomic file replacement primitive
//! - The single-writer run store and its readers

pub mod atomic;
mod run_store;
mod types;

pub use run_store::{
    read_final, read_meta, read_page_lines, read_pages, read_questions, run_dir_name,
    sanitize_topic, RunStore, WriteOutcome, FINAL_FILE, META_FILE, PAGES_FILE, QUESTIONS_FILE,
};
pub use types::{
    Cost, Intent, PageRecord, Priority, QuestionNode, RunMeta, RunStatus, MAX_QUESTION_DEPTH,
};

use thiserror::Error;

/// Errors that can occur while setting up or writing a run
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run store is disabled after a failed initialization")]
    Disabled,

    #[error("Run store has not been initialized")]
    NotInitialized,

    #[error("Run store has been flushed and accepts no more writes")]
    Closed,

    #[error("Run writer has stopped")]
    WorkerGone,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
