//! Durable, single-writer run store
//!
//! A [`RunStore`] owns one run directory. Every mutation after
//! [`RunStore::initialize`] travels through a FIFO queue consumed by a single
//! writer thread, so the page log and `meta.json` are only ever touched by one
//! task at a time. Callers of the `save_*` methods are resumed once their own
//! task has been applied, not when it was merely queued.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, OnceCell};

use crate::storage::atomic::{append_line, atomic_write};
use crate::storage::types::{PageRecord, QuestionNode, RunMeta, RunStatus, MAX_QUESTION_DEPTH};
use crate::storage::{StoreError, StoreResult};

pub const META_FILE: &str = "meta.json";
pub const QUESTIONS_FILE: &str = "questions.json";
pub const PAGES_FILE: &str = "pages.jsonl";
pub const FINAL_FILE: &str = "final.json";

const MAX_SLUG_LEN: usize = 60;

enum WriteOp {
    Page(PageRecord),
    Questions(Vec<QuestionNode>),
    Synthesis(Value),
}

struct WriteTask {
    op: WriteOp,
    done: oneshot::Sender<WriteOutcome>,
}

/// How far a queued write got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The data file and `meta.json` were both updated
    Written,
    /// The data file was updated but `meta.json` could not be rewritten; it is
    /// retried on the next write and at flush
    MetaStale,
    /// Nothing durable happened
    Failed,
}

impl WriteOutcome {
    /// True if the written data itself is on disk, even with stale metadata
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Written | Self::MetaStale)
    }
}

#[derive(Default)]
struct Inner {
    run_dir: Option<PathBuf>,
    disabled: bool,
    queue: Option<mpsc::Sender<WriteTask>>,
    writer: Option<JoinHandle<()>>,
}

/// Crash-consistent persistence for one research run
///
/// Lifecycle: `initialize` -> active -> `flush`. After `flush` the queue is
/// closed and every `save_*` call reports failure.
pub struct RunStore {
    runs_dir: PathBuf,
    inner: Mutex<Inner>,
    flushed: OnceCell<()>,
}

impl RunStore {
    /// Creates a store that will place its run directory under `runs_dir`
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            inner: Mutex::new(Inner::default()),
            flushed: OnceCell::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates the run directory and its initial files, then starts the writer
    ///
    /// Calling this again on an initialized store is a no-op returning the same
    /// directory. If the directory or its files cannot be created the store
    /// disables itself and every later write reports failure.
    pub fn initialize(&self, topic: &str, max_pages: usize) -> StoreResult<PathBuf> {
        let mut inner = self.lock();
        if let Some(dir) = &inner.run_dir {
            return Ok(dir.clone());
        }
        if inner.disabled {
            return Err(StoreError::Disabled);
        }
        if self.flushed.initialized() {
            return Err(StoreError::Closed);
        }

        match self.create_run(topic, max_pages) {
            Ok((dir, meta)) => {
                let (tx, rx) = mpsc::channel();
                let writer = RunWriter::new(dir.clone(), meta);
                let handle = thread::Builder::new()
                    .name("loupe-run-writer".to_string())
                    .spawn(move || writer.run(rx))
                    .map_err(|e| {
                        inner.disabled = true;
                        tracing::error!("Failed to start run writer: {}", e);
                        StoreError::Io(e)
                    })?;

                tracing::info!("Run directory initialized at {}", dir.display());
                inner.run_dir = Some(dir.clone());
                inner.queue = Some(tx);
                inner.writer = Some(handle);
                Ok(dir)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to initialize run under {}: {}",
                    self.runs_dir.display(),
                    e
                );
                inner.disabled = true;
                Err(e)
            }
        }
    }

    fn create_run(&self, topic: &str, max_pages: usize) -> StoreResult<(PathBuf, RunMeta)> {
        fs::create_dir_all(&self.runs_dir)?;

        let started_at = Utc::now();
        let base = run_dir_name(topic, started_at);
        let (run_id, dir) = create_unique_dir(&self.runs_dir, &base)?;

        let meta = RunMeta {
            topic: topic.to_string(),
            started_at,
            status: RunStatus::Running,
            page_count: 0,
            run_id,
            max_pages,
        };

        atomic_write(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?)?;
        atomic_write(&dir.join(QUESTIONS_FILE), b"[]")?;
        atomic_write(&dir.join(PAGES_FILE), b"")?;
        atomic_write(&dir.join(FINAL_FILE), b"null")?;

        Ok((dir, meta))
    }

    /// The run directory, once initialized
    pub fn run_dir(&self) -> Option<PathBuf> {
        self.lock().run_dir.clone()
    }

    /// True if initialization failed and the store refuses all writes
    pub fn is_disabled(&self) -> bool {
        self.lock().disabled
    }

    /// Atomically replaces the question tree snapshot
    pub async fn save_question_tree(&self, tree: &[QuestionNode]) -> bool {
        self.submit(WriteOp::Questions(tree.to_vec())).await == WriteOutcome::Written
    }

    /// Appends a page to the log and updates `pageCount`
    ///
    /// True only if both the log and `meta.json` were written.
    pub async fn save_page_result(&self, record: &PageRecord) -> bool {
        self.record_page(record).await == WriteOutcome::Written
    }

    /// Appends a page to the log, reporting a stale `meta.json` separately
    pub async fn record_page(&self, record: &PageRecord) -> WriteOutcome {
        self.submit(WriteOp::Page(record.clone())).await
    }

    /// Writes the synthesis result and marks the run completed
    pub async fn save_synthesis<T: Serialize>(&self, result: &T) -> bool {
        match serde_json::to_value(result) {
            Ok(value) => self.submit(WriteOp::Synthesis(value)).await == WriteOutcome::Written,
            Err(e) => {
                tracing::warn!("Synthesis result is not serializable: {}", e);
                false
            }
        }
    }

    async fn submit(&self, op: WriteOp) -> WriteOutcome {
        match self.enqueue(op) {
            Ok(rx) => rx.await.unwrap_or(WriteOutcome::Failed),
            Err(e @ StoreError::WorkerGone) => {
                tracing::warn!("Write rejected: {}", e);
                WriteOutcome::Failed
            }
            Err(e) => {
                tracing::debug!("Write rejected: {}", e);
                WriteOutcome::Failed
            }
        }
    }

    fn enqueue(&self, op: WriteOp) -> StoreResult<oneshot::Receiver<WriteOutcome>> {
        let inner = self.lock();
        if inner.disabled {
            return Err(StoreError::Disabled);
        }
        let Some(queue) = inner.queue.as_ref() else {
            return Err(if inner.run_dir.is_some() {
                StoreError::Closed
            } else {
                StoreError::NotInitialized
            });
        };

        let (done, rx) = oneshot::channel();
        queue
            .send(WriteTask { op, done })
            .map_err(|_| StoreError::WorkerGone)?;
        Ok(rx)
    }

    /// Closes the queue and waits for every queued write to be applied
    ///
    /// If no synthesis result was ever written the run is marked `interrupted`.
    /// Concurrent and repeated calls all wait on the same single flush.
    pub async fn flush(&self) {
        self.flushed
            .get_or_init(|| async {
                let (queue, writer) = {
                    let mut inner = self.lock();
                    (inner.queue.take(), inner.writer.take())
                };
                drop(queue);

                if let Some(writer) = writer {
                    match tokio::task::spawn_blocking(move || writer.join()).await {
                        Ok(Ok(())) => tracing::debug!("Run writer drained"),
                        Ok(Err(_)) => tracing::error!("Run writer panicked during shutdown"),
                        Err(e) => tracing::error!("Failed to join run writer: {}", e),
                    }
                }
            })
            .await;
    }
}

/// Applies queued writes one at a time; owns the in-memory `RunMeta`
struct RunWriter {
    dir: PathBuf,
    meta: RunMeta,
    final_written: bool,
    meta_dirty: bool,
}

impl RunWriter {
    fn new(dir: PathBuf, meta: RunMeta) -> Self {
        Self {
            dir,
            meta,
            final_written: false,
            meta_dirty: false,
        }
    }

    fn run(mut self, rx: mpsc::Receiver<WriteTask>) {
        for task in rx {
            let outcome = self.apply(task.op);
            // The caller may have stopped waiting; the write still happened
            let _ = task.done.send(outcome);
        }
        self.finish();
    }

    fn apply(&mut self, op: WriteOp) -> WriteOutcome {
        match op {
            WriteOp::Page(record) => self.append_page(&record),
            WriteOp::Questions(tree) => self.write_questions(&tree),
            WriteOp::Synthesis(value) => self.write_final(&value),
        }
    }

    fn append_page(&mut self, record: &PageRecord) -> WriteOutcome {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize page {}: {}", record.url, e);
                return WriteOutcome::Failed;
            }
        };

        if let Err(e) = append_line(&self.dir.join(PAGES_FILE), &line) {
            tracing::warn!("Failed to append page {}: {}", record.url, e);
            return WriteOutcome::Failed;
        }

        self.meta.page_count += 1;
        self.write_meta()
    }

    fn write_questions(&mut self, tree: &[QuestionNode]) -> WriteOutcome {
        if let Some(deepest) = tree.iter().map(QuestionNode::max_depth).max() {
            if deepest > MAX_QUESTION_DEPTH {
                tracing::warn!("Question tree reaches depth {}, deeper than {}", deepest, MAX_QUESTION_DEPTH);
            }
        }

        let result = serde_json::to_vec_pretty(tree)
            .map_err(io::Error::from)
            .and_then(|bytes| atomic_write(&self.dir.join(QUESTIONS_FILE), &bytes));
        match result {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                tracing::warn!("Failed to write question tree: {}", e);
                WriteOutcome::Failed
            }
        }
    }

    fn write_final(&mut self, value: &Value) -> WriteOutcome {
        if value.is_null() {
            tracing::warn!("Refusing to store a null synthesis result");
            return WriteOutcome::Failed;
        }

        let result = serde_json::to_vec_pretty(value)
            .map_err(io::Error::from)
            .and_then(|bytes| atomic_write(&self.dir.join(FINAL_FILE), &bytes));
        if let Err(e) = result {
            tracing::warn!("Failed to write synthesis result: {}", e);
            return WriteOutcome::Failed;
        }

        self.final_written = true;
        if self.meta.status.can_transition_to(RunStatus::Completed) {
            self.meta.status = RunStatus::Completed;
        }
        self.write_meta()
    }

    fn write_meta(&mut self) -> WriteOutcome {
        let result = serde_json::to_vec_pretty(&self.meta)
            .map_err(io::Error::from)
            .and_then(|bytes| atomic_write(&self.dir.join(META_FILE), &bytes));
        match result {
            Ok(()) => {
                self.meta_dirty = false;
                WriteOutcome::Written
            }
            Err(e) => {
                tracing::warn!("Failed to write run metadata: {}", e);
                self.meta_dirty = true;
                WriteOutcome::MetaStale
            }
        }
    }

    fn finish(mut self) {
        if !self.final_written && self.meta.status.can_transition_to(RunStatus::Interrupted) {
            self.meta.status = RunStatus::Interrupted;
            self.meta_dirty = true;
        }
        if self.meta_dirty {
            self.write_meta();
        }
        tracing::info!(
            "Run {} closed as {} with {} pages",
            self.meta.run_id,
            self.meta.status.as_str(),
            self.meta.page_count
        );
    }
}

/// Builds `<slug>-<YYYYMMDD-HHMMSS>` for a topic
pub fn run_dir_name(topic: &str, started_at: DateTime<Utc>) -> String {
    format!("{}-{}", sanitize_topic(topic), started_at.format("%Y%m%d-%H%M%S"))
}

/// Lowercases the topic and collapses everything but ASCII alphanumerics to `-`
pub fn sanitize_topic(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "run".to_string()
    } else {
        slug.to_string()
    }
}

fn create_unique_dir(parent: &Path, base: &str) -> io::Result<(String, PathBuf)> {
    let mut name = base.to_string();
    let mut attempt = 1;
    loop {
        let dir = parent.join(&name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((name, dir)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 100 => {
                name = format!("{}-{}", base, attempt);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reads `meta.json`; missing or unparseable metadata yields defaults
pub fn read_meta(run_dir: &Path) -> RunMeta {
    read_json(&run_dir.join(META_FILE)).unwrap_or_default()
}

/// Reads the question tree snapshot; missing or unparseable yields an empty tree
pub fn read_questions(run_dir: &Path) -> Vec<QuestionNode> {
    read_json(&run_dir.join(QUESTIONS_FILE)).unwrap_or_default()
}

/// Reads the synthesis result, `None` while it is still `null`
pub fn read_final(run_dir: &Path) -> Option<Value> {
    read_json::<Value>(&run_dir.join(FINAL_FILE)).filter(|v| !v.is_null())
}

/// Reads every well-formed record from the page log
pub fn read_pages(run_dir: &Path) -> Vec<PageRecord> {
    read_page_lines(run_dir).0
}

/// Reads the page log, returning the records and the number of malformed lines
///
/// Only the last line can be damaged by an interrupted append.
pub fn read_page_lines(run_dir: &Path) -> (Vec<PageRecord>, usize) {
    let content = match fs::read_to_string(run_dir.join(PAGES_FILE)) {
        Ok(content) => content,
        Err(_) => return (Vec::new(), 0),
    };

    let mut records = Vec::new();
    let mut malformed = 0;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<PageRecord>(line) {
            Ok(record) => records.push(record),
            Err(_) => malformed += 1,
        }
    }
    (records, malformed)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Ignoring unparseable {}: {}", path.display(), e);
            None
        }
    }
}
