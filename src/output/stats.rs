//! Statistics generation from a run directory
//!
//! This module summarizes what a run has persisted so far, whether the run
//! finished, was interrupted, or is still in progress.

use crate::storage::{read_final, read_meta, read_page_lines, RunMeta};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use url::Url;

/// Run statistics summary
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Metadata as last written (defaults if unreadable)
    pub meta: RunMeta,

    /// Well-formed lines in the page log
    pub logged_pages: usize,

    /// Lines in the page log that could not be parsed
    pub malformed_lines: usize,

    /// Pages per host, sorted by host
    pub pages_by_host: BTreeMap<String, usize>,

    /// Distinct same-host links recorded across all pages
    pub unique_links: usize,

    /// Sum of extracted text lengths in characters
    pub total_text_chars: usize,

    /// Whether a synthesis result has been written
    pub has_final: bool,
}

impl RunStatistics {
    pub fn average_text_chars(&self) -> usize {
        if self.logged_pages == 0 {
            0
        } else {
            self.total_text_chars / self.logged_pages
        }
    }

    /// True if `pageCount` in meta agrees with the page log
    pub fn is_consistent(&self) -> bool {
        self.meta.page_count == self.logged_pages
    }
}

/// Loads statistics from a run directory
///
/// Missing or damaged files contribute defaults rather than errors.
pub fn load_run_statistics(run_dir: &Path) -> RunStatistics {
    let meta = read_meta(run_dir);
    let (pages, malformed_lines) = read_page_lines(run_dir);

    let mut pages_by_host = BTreeMap::new();
    let mut links = HashSet::new();
    let mut total_text_chars = 0;

    for page in &pages {
        let host = Url::parse(&page.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_else(|| "<unknown>".to_string());
        *pages_by_host.entry(host).or_insert(0) += 1;
        total_text_chars += page.extracted_text.chars().count();
        links.extend(page.links.iter().cloned());
    }

    RunStatistics {
        meta,
        logged_pages: pages.len(),
        malformed_lines,
        pages_by_host,
        unique_links: links.len(),
        total_text_chars,
        has_final: read_final(run_dir).is_some(),
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_run_statistics(stats: &RunStatistics) {
    println!("=== Run Statistics ===\n");

    println!("Run:");
    println!("  Id: {}", stats.meta.run_id);
    println!("  Topic: {}", stats.meta.topic);
    println!("  Started: {}", stats.meta.started_at.to_rfc3339());
    println!("  Status: {}", stats.meta.status.as_str());
    println!("  Page budget: {}", stats.meta.max_pages);
    println!(
        "  Synthesis: {}",
        if stats.has_final { "written" } else { "pending" }
    );
    println!();

    println!("Pages:");
    println!("  Recorded in meta: {}", stats.meta.page_count);
    println!("  Lines in page log: {}", stats.logged_pages);
    if stats.malformed_lines > 0 {
        println!("  Malformed lines: {}", stats.malformed_lines);
    }
    println!("  Unique links: {}", stats.unique_links);
    println!("  Average text length: {} chars", stats.average_text_chars());
    println!();

    if !stats.pages_by_host.is_empty() {
        println!("Pages by Host:");
        let mut host_counts: Vec<_> = stats.pages_by_host.iter().collect();
        host_counts.sort_by(|a, b| b.1.cmp(a.1));
        for (host, count) in host_counts {
            println!("  {}: {}", host, count);
        }
        println!();
    }

    if !stats.is_consistent() {
        println!("Warning: meta pageCount does not match the page log");
    }
}
