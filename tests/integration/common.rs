//! Shared fixtures for the integration tests

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use loupe::config::Config;
use loupe::crawler::FetchSettings;
use loupe::storage::PageRecord;

const SENTENCE: &str = "Inspection keeps the readable prose of every page it visits. ";

/// A configuration with no jitter and a short timeout, writing under `runs_dir`
pub fn test_config(runs_dir: &Path) -> Config {
    let mut config = Config::default();
    config.inspector.jitter_min_ms = 0;
    config.inspector.jitter_max_ms = 0;
    config.inspector.fetch_timeout_ms = 2_000;
    config.output.runs_dir = runs_dir.to_path_buf();
    config
}

pub fn test_fetch_settings() -> FetchSettings {
    FetchSettings {
        timeout: Duration::from_secs(2),
        max_redirects: 5,
        max_body_bytes: 64 * 1024,
        user_agents: vec!["TestAgent/1.0".to_string()],
    }
}

/// Roughly `chars` characters of prose that survives extraction
pub fn prose(chars: usize) -> String {
    SENTENCE.repeat(chars / SENTENCE.len() + 1)
}

/// An HTML article with a title, `text_chars` of prose and the given links
pub fn article(title: &str, text_chars: usize, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .enumerate()
        .map(|(i, href)| format!(r#"<li><a href="{}">Link {}</a></li>"#, href, i))
        .collect();
    format!(
        r#"<html><head><title>{}</title></head><body>
        <nav>Home | About | Contact</nav>
        <main><p>{}</p><ul>{}</ul></main>
        </body></html>"#,
        title,
        prose(text_chars),
        anchors
    )
}

pub fn page_record(url: &str) -> PageRecord {
    PageRecord {
        url: url.to_string(),
        title: "Title".to_string(),
        extracted_text: prose(200),
        links: vec![format!("{}/next", url)],
        timestamp: Utc::now(),
    }
}
