use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Loupe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inspector: InspectorConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Inspector behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct InspectorConfig {
    /// Maximum number of simultaneous fetches
    pub fetch_concurrency: usize,

    /// Maximum number of simultaneous question sessions
    pub question_concurrency: usize,

    /// Per-fetch timeout (milliseconds)
    pub fetch_timeout_ms: u64,

    /// Redirect hops followed before giving up
    pub max_redirects: usize,

    /// Lower bound of the pre-fetch jitter window (milliseconds)
    pub jitter_min_ms: u64,

    /// Upper bound of the pre-fetch jitter window (milliseconds)
    pub jitter_max_ms: u64,

    /// Depth-1 links expanded from each depth-0 page
    pub expansion_cap: usize,

    /// Extracted text shorter than this is not a page
    pub min_text_length: usize,

    /// Extracted text is truncated to this many characters
    pub max_text_length: usize,

    /// Run-wide page budget; reaching it cancels the run
    pub max_pages: usize,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 3,
            question_concurrency: 5,
            fetch_timeout_ms: 15_000,
            max_redirects: 5,
            jitter_min_ms: 300,
            jitter_max_ms: 900,
            expansion_cap: 25,
            min_text_length: 100,
            max_text_length: 50_000,
            max_pages: 200,
        }
    }
}

impl InspectorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// User agent rotation pool
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Candidate User-Agent strings; one is picked at random per request
    #[serde(default = "default_user_agents")]
    pub pool: Vec<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            pool: default_user_agents(),
        }
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory under which every run directory is created
    #[serde(rename = "runs-dir", default = "default_runs_dir")]
    pub runs_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
        }
    }
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("./runs")
}
