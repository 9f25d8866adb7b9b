//! Run store persistence tests

use std::fs;
use std::sync::Arc;

use futures::future::join_all;
use loupe::output::load_run_statistics;
use loupe::storage::{
    read_final, read_meta, read_page_lines, read_pages, read_questions, QuestionNode, RunStatus,
    RunStore, WriteOutcome, FINAL_FILE, META_FILE, PAGES_FILE, QUESTIONS_FILE,
};
use serde_json::json;
use tempfile::TempDir;

use crate::common::page_record;

#[tokio::test]
async fn test_initialize_creates_run_files() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());

    let run_dir = store.initialize("Memory Safety!", 50).expect("Failed to initialize");

    let name = run_dir.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("memory-safety-"), "unexpected run dir {}", name);
    for file in [META_FILE, QUESTIONS_FILE, PAGES_FILE, FINAL_FILE] {
        assert!(run_dir.join(file).is_file(), "{} missing", file);
    }

    let meta = read_meta(&run_dir);
    assert_eq!(meta.topic, "Memory Safety!");
    assert_eq!(meta.status, RunStatus::Running);
    assert_eq!(meta.page_count, 0);
    assert_eq!(meta.max_pages, 50);
    assert_eq!(meta.run_id, name);
    assert!(read_questions(&run_dir).is_empty());
    assert!(read_pages(&run_dir).is_empty());
    assert!(read_final(&run_dir).is_none());

    // A second initialize is a no-op
    assert_eq!(store.initialize("Other", 1).unwrap(), run_dir);
    store.flush().await;
}

#[tokio::test]
async fn test_meta_uses_camel_case_keys() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("keys", 10).unwrap();
    store.flush().await;

    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(run_dir.join(META_FILE)).unwrap()).unwrap();
    assert!(raw.get("startedAt").is_some());
    assert!(raw.get("pageCount").is_some());
    assert!(raw.get("runId").is_some());
    assert_eq!(raw["status"], "interrupted");
}

#[tokio::test]
async fn test_flush_without_synthesis_marks_interrupted() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("interrupted", 10).unwrap();

    for i in 0..4 {
        assert!(store.save_page_result(&page_record(&format!("https://example.com/{}", i))).await);
    }
    assert_eq!(read_meta(&run_dir).page_count, 4);
    assert_eq!(read_meta(&run_dir).status, RunStatus::Running);

    store.flush().await;

    let meta = read_meta(&run_dir);
    assert_eq!(meta.status, RunStatus::Interrupted);
    assert_eq!(meta.page_count, 4);
    let pages = read_pages(&run_dir);
    assert_eq!(pages.len(), 4);
    assert_eq!(pages[0].url, "https://example.com/0");
    assert_eq!(pages[3].url, "https://example.com/3");
}

#[tokio::test]
async fn test_synthesis_marks_completed() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("completed", 10).unwrap();

    assert!(store.save_page_result(&page_record("https://example.com/a")).await);
    assert!(store.save_synthesis(&json!({"summary": "done", "citations": [1]})).await);
    assert_eq!(read_meta(&run_dir).status, RunStatus::Completed);

    store.flush().await;

    let meta = read_meta(&run_dir);
    assert_eq!(meta.status, RunStatus::Completed);
    assert_eq!(meta.page_count, 1);
    assert_eq!(read_final(&run_dir), Some(json!({"summary": "done", "citations": [1]})));
}

#[tokio::test]
async fn test_null_synthesis_is_rejected() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("null", 10).unwrap();

    assert!(!store.save_synthesis(&serde_json::Value::Null).await);
    store.flush().await;

    assert_eq!(read_meta(&run_dir).status, RunStatus::Interrupted);
    assert!(read_final(&run_dir).is_none());
}

#[tokio::test]
async fn test_question_tree_snapshot_replaced() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("questions", 10).unwrap();

    let first = vec![QuestionNode::root("q1", "First?", "planner")];
    assert!(store.save_question_tree(&first).await);

    let mut root = QuestionNode::root("q1", "First?", "planner");
    let mut child = QuestionNode::root("q1.1", "Deeper?", "planner");
    child.depth = 1;
    child.parent_id = Some("q1".to_string());
    root.sub_questions.push(child);
    let second = vec![root, QuestionNode::root("q2", "Second?", "planner")];
    assert!(store.save_question_tree(&second).await);

    assert_eq!(read_questions(&run_dir), second);

    let raw = fs::read_to_string(run_dir.join(QUESTIONS_FILE)).unwrap();
    assert!(raw.contains("\"subQuestions\""));
    assert!(raw.contains("\"parentId\": \"q1\""));
    store.flush().await;
}

#[tokio::test]
async fn test_concurrent_saves_keep_count_consistent() {
    let runs = TempDir::new().unwrap();
    let store = Arc::new(RunStore::new(runs.path()));
    let run_dir = store.initialize("concurrent", 100).unwrap();

    let saves = (0..50).map(|i| {
        let store = store.clone();
        async move {
            store
                .save_page_result(&page_record(&format!("https://example.com/{}", i)))
                .await
        }
    });
    assert!(join_all(saves).await.into_iter().all(|ok| ok));

    store.flush().await;

    let stats = load_run_statistics(&run_dir);
    assert_eq!(stats.logged_pages, 50);
    assert_eq!(stats.malformed_lines, 0);
    assert!(stats.is_consistent());
    assert_eq!(stats.pages_by_host.get("example.com"), Some(&50));
}

#[tokio::test]
async fn test_concurrent_flushes_collapse() {
    let runs = TempDir::new().unwrap();
    let store = Arc::new(RunStore::new(runs.path()));
    let run_dir = store.initialize("flushes", 10).unwrap();
    assert!(store.save_page_result(&page_record("https://example.com/a")).await);

    let flushes = (0..5).map(|_| {
        let store = store.clone();
        async move { store.flush().await }
    });
    join_all(flushes).await;
    store.flush().await;

    let meta = read_meta(&run_dir);
    assert_eq!(meta.status, RunStatus::Interrupted);
    assert_eq!(meta.page_count, 1);
}

#[tokio::test]
async fn test_writes_after_flush_fail() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("closed", 10).unwrap();
    store.flush().await;

    assert!(!store.save_page_result(&page_record("https://example.com/late")).await);
    assert!(!store.save_synthesis(&json!({"late": true})).await);
    assert!(read_pages(&run_dir).is_empty());
    assert_eq!(read_meta(&run_dir).status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_writes_before_initialize_fail() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());

    assert!(!store.save_page_result(&page_record("https://example.com/early")).await);
    assert!(store.run_dir().is_none());
    store.flush().await;
}

#[tokio::test]
async fn test_unwritable_runs_dir_disables_store() {
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let store = RunStore::new(blocker.path().join("runs"));

    assert!(store.initialize("disabled", 10).is_err());
    assert!(store.is_disabled());
    assert!(store.run_dir().is_none());
    assert!(!store.save_page_result(&page_record("https://example.com/a")).await);
    assert!(!store.save_question_tree(&[]).await);

    // Flushing a disabled store is harmless
    store.flush().await;
}

#[tokio::test]
async fn test_same_topic_gets_distinct_directories() {
    let runs = TempDir::new().unwrap();
    let first = RunStore::new(runs.path());
    let second = RunStore::new(runs.path());

    let a = first.initialize("same topic", 10).unwrap();
    let b = second.initialize("same topic", 10).unwrap();
    assert_ne!(a, b);

    first.flush().await;
    second.flush().await;
}

#[tokio::test]
async fn test_append_after_torn_tail_keeps_new_record() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("torn", 10).unwrap();

    assert!(store.save_page_result(&page_record("https://example.com/a")).await);
    // Residue of an append that died part-way
    let mut log = fs::OpenOptions::new()
        .append(true)
        .open(run_dir.join(PAGES_FILE))
        .unwrap();
    std::io::Write::write_all(&mut log, b"{\"url\":\"https://exa").unwrap();
    drop(log);

    assert!(store.save_page_result(&page_record("https://example.com/b")).await);
    store.flush().await;

    let (records, malformed) = read_page_lines(&run_dir);
    assert_eq!(malformed, 1);
    let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    assert_eq!(read_meta(&run_dir).page_count, 2);
}

#[tokio::test]
async fn test_stale_meta_is_reported_and_repaired() {
    let runs = TempDir::new().unwrap();
    let store = RunStore::new(runs.path());
    let run_dir = store.initialize("stale", 10).unwrap();

    // A directory in place of meta.json makes the rename fail
    let meta_path = run_dir.join(META_FILE);
    fs::remove_file(&meta_path).unwrap();
    fs::create_dir(&meta_path).unwrap();
    fs::write(meta_path.join("blocker"), b"x").unwrap();

    let outcome = store.record_page(&page_record("https://example.com/a")).await;
    assert_eq!(outcome, WriteOutcome::MetaStale);
    assert!(outcome.is_durable());
    assert!(!store.save_page_result(&page_record("https://example.com/b")).await);
    assert_eq!(read_pages(&run_dir).len(), 2);

    fs::remove_dir_all(&meta_path).unwrap();
    store.flush().await;

    let meta = read_meta(&run_dir);
    assert_eq!(meta.page_count, 2);
    assert_eq!(meta.status, RunStatus::Interrupted);
}
