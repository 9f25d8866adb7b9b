//! State module for tracking inspection progress
//!
//! # Components
//!
//! - `TaskState`: the lifecycle of one URL within an inspection session

mod task_state;

// Re-export main types
pub use task_state::TaskState;
