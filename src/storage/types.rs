//! Persisted data model
//!
//! Field names serialize as camelCase so the run directory is readable by the
//! downstream synthesis step without a translation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deepest level a question node may sit at
pub const MAX_QUESTION_DEPTH: u8 = 2;

/// What kind of answer a research question is after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Overview,
    Definition,
    Mechanism,
    Comparison,
    Evidence,
    Application,
    Risk,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Core,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cost {
    Low,
    Medium,
    High,
}

/// One node of the research question tree
///
/// Produced upstream and never mutated here; the inspector only reads `id`
/// and `question`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionNode {
    pub id: String,
    pub question: String,
    pub depth: u8,
    pub intent: Intent,
    pub priority: Priority,
    pub cost: Cost,
    #[serde(default)]
    pub search_hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_questions: Vec<QuestionNode>,
}

impl QuestionNode {
    /// Builds a depth-0 core question with no hints
    pub fn root(id: impl Into<String>, question: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            depth: 0,
            intent: Intent::Overview,
            priority: Priority::Core,
            cost: Cost::Medium,
            search_hints: Vec::new(),
            parent_id: None,
            source: source.into(),
            sub_questions: Vec::new(),
        }
    }

    /// Depth of the deepest node in this subtree
    pub fn max_depth(&self) -> u8 {
        self.sub_questions
            .iter()
            .map(QuestionNode::max_depth)
            .max()
            .unwrap_or(0)
            .max(self.depth)
    }
}

/// One successfully inspected page, appended to the page log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub extracted_text: String,
    pub links: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Interrupted,
}

impl RunStatus {
    /// Status only moves forward: `running -> completed | interrupted`
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Completed) | (Self::Running, Self::Interrupted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Run-level metadata, rewritten atomically after every page append
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunMeta {
    pub topic: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub page_count: usize,
    pub run_id: String,
    pub max_pages: usize,
}
