/// Task state definitions for URLs inspected within one session
use std::fmt;

/// Represents the current state of a URL task in an inspection session
///
/// ```text
/// Unclaimed -> Claimed -> { FetchedSuccess | FetchedFailure | Cancelled }
/// ```
///
/// Terminal states never re-enter `Claimed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// URL has not been claimed by any task in this session
    Unclaimed,

    /// URL is owned by a task that has not finished yet
    Claimed,

    /// Page was fetched, extracted and persisted
    FetchedSuccess,

    /// Fetch, extraction or persistence failed
    FetchedFailure,

    /// Task observed the cancellation signal before finishing
    Cancelled,
}

impl TaskState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FetchedSuccess | Self::FetchedFailure | Self::Cancelled
        )
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::FetchedSuccess)
    }

    /// Checks whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (Self::Unclaimed, Self::Claimed) => true,
            (Self::Claimed, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Returns the lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Claimed => "claimed",
            Self::FetchedSuccess => "fetched_success",
            Self::FetchedFailure => "fetched_failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
