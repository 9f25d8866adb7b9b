//! Inspection coordinator - depth-bounded page inspection for one question
//!
//! This module contains the session logic that ties the other crawler parts
//! together:
//! - Claiming URLs so each normalized URL is attempted once per session
//! - Admitting fetches through the shared governor
//! - Extracting and persisting every page that yields enough text
//! - Expanding depth-0 pages one level into their same-host links
//! - Honoring the shared cancellation token and the run-wide page cap

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::{validate, Config, InspectorConfig};
use crate::crawler::fetcher::{FetchSettings, Fetcher};
use crate::crawler::governor::Governor;
use crate::crawler::parser::extract_page;
use crate::state::TaskState;
use crate::storage::{PageRecord, QuestionNode, RunStore, WriteOutcome};
use crate::url::normalize_url;
use crate::{FetchError, LoupeError};

/// Progress callback, invoked with the session's saved-page count
pub type ProgressFn<'a> = dyn Fn(usize) + Send + Sync + 'a;

/// Why a URL produced no page
#[derive(Debug)]
pub enum SkipReason {
    /// Another task in this session already owns the normalized URL
    AlreadyClaimed,
    /// The cancellation signal was observed at a checkpoint
    Cancelled,
    /// The fetch failed
    Fetch(FetchError),
    /// Extracted text was shorter than the minimum
    TooShort { length: usize },
    /// The run store did not record the page
    PersistFailed,
}

/// Result of inspecting one URL
#[derive(Debug)]
pub enum InspectOutcome {
    Saved {
        url: String,
        depth: u8,
        links: Vec<String>,
    },
    Skipped {
        url: String,
        depth: u8,
        reason: SkipReason,
    },
}

impl InspectOutcome {
    fn skipped(url: &str, depth: u8, reason: SkipReason) -> Self {
        Self::Skipped {
            url: url.to_string(),
            depth,
            reason,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Saved { url, .. } | Self::Skipped { url, .. } => url,
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            Self::Saved { depth, .. } | Self::Skipped { depth, .. } => *depth,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Saved { .. } => None,
            Self::Skipped { reason, .. } => Some(reason),
        }
    }

    /// The terminal task state this outcome settles a claimed URL into
    fn task_state(&self) -> TaskState {
        match self {
            Self::Saved { .. } => TaskState::FetchedSuccess,
            Self::Skipped {
                reason: SkipReason::Cancelled,
                ..
            } => TaskState::Cancelled,
            Self::Skipped {
                reason: SkipReason::Fetch(e),
                ..
            } if e.is_cancelled() => TaskState::Cancelled,
            Self::Skipped { .. } => TaskState::FetchedFailure,
        }
    }
}

/// Summary of one inspection session
#[derive(Debug)]
pub struct SessionReport {
    pub question_id: String,
    /// Pages persisted by this session
    pub pages_saved: usize,
    /// Normalized URLs claimed by this session
    pub claimed: usize,
    /// Fetches actually issued
    pub fetch_attempts: usize,
    /// Every seed and expansion outcome, in no particular order
    pub outcomes: Vec<InspectOutcome>,
}

impl SessionReport {
    fn empty(question: &QuestionNode) -> Self {
        Self {
            question_id: question.id.clone(),
            pages_saved: 0,
            claimed: 0,
            fetch_attempts: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn saved_urls(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_saved())
            .map(InspectOutcome::url)
            .collect()
    }
}

/// Per-question state: which URLs are claimed and how far each got
struct Session<'a> {
    question: &'a QuestionNode,
    cancel: &'a CancellationToken,
    on_progress: &'a ProgressFn<'a>,
    tasks: Mutex<HashMap<String, TaskState>>,
    pages_saved: AtomicUsize,
    fetch_attempts: AtomicUsize,
}

impl<'a> Session<'a> {
    fn new(
        question: &'a QuestionNode,
        cancel: &'a CancellationToken,
        on_progress: &'a ProgressFn<'a>,
    ) -> Self {
        Self {
            question,
            cancel,
            on_progress,
            tasks: Mutex::new(HashMap::new()),
            pages_saved: AtomicUsize::new(0),
            fetch_attempts: AtomicUsize::new(0),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, TaskState>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims a normalized URL; false if it was already claimed
    fn claim(&self, normalized: &str) -> bool {
        match self.tasks().entry(normalized.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(TaskState::Claimed);
                true
            }
        }
    }

    fn is_claimed(&self, normalized: &str) -> bool {
        self.tasks().contains_key(normalized)
    }

    fn settle(&self, normalized: &str, next: TaskState) {
        let mut tasks = self.tasks();
        if let Some(state) = tasks.get_mut(normalized) {
            if state.can_transition_to(next) {
                *state = next;
            } else {
                tracing::warn!(
                    "Ignoring task transition {} -> {} for {}",
                    state,
                    next,
                    normalized
                );
            }
        }
    }

    fn claimed(&self) -> usize {
        self.tasks().len()
    }
}

/// Inspects seed URLs for research questions and records every page it keeps
pub struct Inspector {
    fetcher: Fetcher,
    fetch_governor: Governor,
    question_governor: Governor,
    store: Arc<RunStore>,
    settings: InspectorConfig,
    pages_saved: AtomicUsize,
}

impl Inspector {
    /// Creates an inspector from configuration, writing pages to `store`
    ///
    /// The configuration is validated again, since it may have been built in
    /// code rather than loaded from a file.
    pub fn new(config: &Config, store: Arc<RunStore>) -> Result<Self, LoupeError> {
        validate(config)?;
        let fetcher = Fetcher::new(FetchSettings::from_config(config))?;
        Ok(Self::with_fetcher(config.inspector.clone(), fetcher, store))
    }

    /// Creates an inspector around an existing fetcher
    pub fn with_fetcher(settings: InspectorConfig, fetcher: Fetcher, store: Arc<RunStore>) -> Self {
        Self {
            fetch_governor: Governor::new(settings.fetch_concurrency),
            question_governor: Governor::new(settings.question_concurrency),
            fetcher,
            store,
            settings,
            pages_saved: AtomicUsize::new(0),
        }
    }

    /// The governor bounding simultaneous fetches
    pub fn fetch_governor(&self) -> &Governor {
        &self.fetch_governor
    }

    /// The governor bounding simultaneous sessions
    pub fn question_governor(&self) -> &Governor {
        &self.question_governor
    }

    /// Pages saved across every session of this inspector
    pub fn pages_saved(&self) -> usize {
        self.pages_saved.load(Ordering::SeqCst)
    }

    /// Runs one session per question, at most `question_concurrency` at a time
    pub async fn inspect_questions(
        &self,
        work: &[(QuestionNode, Vec<String>)],
        cancel: &CancellationToken,
        on_progress: &ProgressFn<'_>,
    ) -> Vec<SessionReport> {
        let sessions = work.iter().map(|(question, seeds)| async move {
            let Some(_permit) = self.question_governor.acquire().await else {
                return SessionReport::empty(question);
            };
            if cancel.is_cancelled() {
                tracing::debug!("Skipping question {} after cancellation", question.id);
                return SessionReport::empty(question);
            }
            self.inspect(question, seeds, cancel, on_progress).await
        });

        join_all(sessions).await
    }

    /// Inspects the seeds of one question plus one level of expansion
    ///
    /// Never fails: every per-URL failure is absorbed and shows up only as a
    /// skipped outcome in the returned report.
    pub async fn inspect(
        &self,
        question: &QuestionNode,
        seeds: &[String],
        cancel: &CancellationToken,
        on_progress: &ProgressFn<'_>,
    ) -> SessionReport {
        tracing::info!(
            "Inspecting question {} ({} seeds): {}",
            question.id,
            seeds.len(),
            question.question
        );

        let session = Session::new(question, cancel, on_progress);
        let seed_tasks = seeds.iter().map(|seed| self.inspect_seed(&session, seed));
        let outcomes: Vec<InspectOutcome> = join_all(seed_tasks).await.into_iter().flatten().collect();

        let report = SessionReport {
            question_id: question.id.clone(),
            pages_saved: session.pages_saved.load(Ordering::SeqCst),
            claimed: session.claimed(),
            fetch_attempts: session.fetch_attempts.load(Ordering::SeqCst),
            outcomes,
        };

        tracing::info!(
            "Question {} finished: {} pages saved, {} URLs claimed, {} fetches",
            report.question_id,
            report.pages_saved,
            report.claimed,
            report.fetch_attempts
        );
        report
    }

    /// Inspects a seed and, if it was saved, its depth-1 expansion
    async fn inspect_seed(&self, session: &Session<'_>, seed: &str) -> Vec<InspectOutcome> {
        let outcome = self.inspect_url(session, seed, 0).await;

        let links = match &outcome {
            InspectOutcome::Saved { links, .. } => links.clone(),
            InspectOutcome::Skipped { .. } => return vec![outcome],
        };

        if session.cancel.is_cancelled() {
            return vec![outcome];
        }

        let expansion: Vec<String> = links
            .into_iter()
            .filter(|link| !session.is_claimed(&normalize_url(link)))
            .take(self.settings.expansion_cap)
            .collect();

        if !expansion.is_empty() {
            tracing::debug!(
                "Expanding {} into {} same-host links",
                outcome.url(),
                expansion.len()
            );
        }

        let expanded = join_all(expansion.iter().map(|link| self.inspect_url(session, link, 1))).await;

        let mut outcomes = Vec::with_capacity(expanded.len() + 1);
        outcomes.push(outcome);
        outcomes.extend(expanded);
        outcomes
    }

    /// Claims, fetches, extracts and persists a single URL
    async fn inspect_url(&self, session: &Session<'_>, url: &str, depth: u8) -> InspectOutcome {
        if session.cancel.is_cancelled() {
            return InspectOutcome::skipped(url, depth, SkipReason::Cancelled);
        }

        let normalized = normalize_url(url);
        if !session.claim(&normalized) {
            return InspectOutcome::skipped(url, depth, SkipReason::AlreadyClaimed);
        }

        let outcome = self.fetch_and_record(session, url, depth).await;
        session.settle(&normalized, outcome.task_state());

        match &outcome {
            InspectOutcome::Saved { .. } => {}
            InspectOutcome::Skipped { reason, .. } => {
                tracing::debug!("Skipped {} (depth {}): {:?}", url, depth, reason);
            }
        }
        outcome
    }

    async fn fetch_and_record(&self, session: &Session<'_>, url: &str, depth: u8) -> InspectOutcome {
        let cancel = session.cancel;

        let Some(permit) = self.fetch_governor.acquire().await else {
            return InspectOutcome::skipped(url, depth, SkipReason::Cancelled);
        };
        if cancel.is_cancelled() {
            return InspectOutcome::skipped(url, depth, SkipReason::Cancelled);
        }

        let delay = self.jitter();
        tokio::select! {
            _ = cancel.cancelled() => {
                return InspectOutcome::skipped(url, depth, SkipReason::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
        if cancel.is_cancelled() {
            return InspectOutcome::skipped(url, depth, SkipReason::Cancelled);
        }

        session.fetch_attempts.fetch_add(1, Ordering::SeqCst);
        let fetched = self.fetcher.fetch(url, cancel).await;
        drop(permit);

        if cancel.is_cancelled() {
            return InspectOutcome::skipped(url, depth, SkipReason::Cancelled);
        }
        let page = match fetched {
            Ok(page) => page,
            Err(e) => return InspectOutcome::skipped(url, depth, SkipReason::Fetch(e)),
        };

        let extracted = extract_page(&page.body, &page.final_url, self.settings.max_text_length);
        let length = extracted.text_len();
        if length < self.settings.min_text_length {
            return InspectOutcome::skipped(url, depth, SkipReason::TooShort { length });
        }

        let record = PageRecord {
            url: url.to_string(),
            title: extracted.title,
            extracted_text: extracted.text,
            links: extracted.links,
            timestamp: Utc::now(),
        };
        match self.store.record_page(&record).await {
            WriteOutcome::Written => {}
            WriteOutcome::MetaStale => {
                tracing::warn!("Saved {} but run metadata is stale until the next write", url);
            }
            WriteOutcome::Failed => {
                return InspectOutcome::skipped(url, depth, SkipReason::PersistFailed);
            }
        }

        let session_count = session.pages_saved.fetch_add(1, Ordering::SeqCst) + 1;
        (session.on_progress)(session_count);
        tracing::info!(
            "Saved {} for question {} ({} chars, depth {})",
            url,
            session.question.id,
            length,
            depth
        );

        let total = self.pages_saved.fetch_add(1, Ordering::SeqCst) + 1;
        if total >= self.settings.max_pages && !cancel.is_cancelled() {
            tracing::info!("Page budget of {} reached, cancelling run", self.settings.max_pages);
            cancel.cancel();
        }

        InspectOutcome::Saved {
            url: url.to_string(),
            depth,
            links: record.links,
        }
    }

    fn jitter(&self) -> Duration {
        let min = self.settings.jitter_min_ms;
        let max = self.settings.jitter_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
