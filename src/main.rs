//! Loupe main entry point
//!
//! This is the command-line interface for the Loupe page inspector.

use anyhow::{bail, Context};
use clap::Parser;
use loupe::config::{load_config_with_hash, Config};
use loupe::crawler::{CancellationToken, Inspector};
use loupe::output::{load_run_statistics, print_run_statistics};
use loupe::storage::{QuestionNode, RunStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Loupe: inspect web pages for a research run
///
/// Loupe fetches seed pages under a concurrency budget, extracts clean text
/// and same-site links, expands one level deeper, and records every page in a
/// crash-consistent run directory.
#[derive(Parser, Debug)]
#[command(name = "loupe")]
#[command(version)]
#[command(about = "A concurrent, depth-bounded page inspector", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Research topic; names the run directory
    #[arg(short, long, required_unless_present = "stats")]
    topic: Option<String>,

    /// Question the seeds are inspected for (defaults to the topic)
    #[arg(long)]
    question: Option<String>,

    /// Seed URL (repeatable)
    #[arg(short, long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be inspected without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics for an existing run directory and exit
    #[arg(long, value_name = "RUN_DIR", conflicts_with = "dry_run")]
    stats: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if let Some(run_dir) = &cli.stats {
        print_run_statistics(&load_run_statistics(run_dir));
        return Ok(());
    }

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let topic = cli.topic.clone().unwrap_or_default();
    let question = cli.question.clone().unwrap_or_else(|| topic.clone());

    if cli.dry_run {
        handle_dry_run(&config, &topic, &question, &cli.seeds);
        return Ok(());
    }

    if cli.seeds.is_empty() {
        bail!("at least one --seed URL is required");
    }

    handle_inspect(config, &topic, &question, &cli.seeds).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("loupe=info,warn"),
            1 => EnvFilter::new("loupe=debug,info"),
            2 => EnvFilter::new("loupe=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration and seeds
fn handle_dry_run(config: &Config, topic: &str, question: &str, seeds: &[String]) {
    let inspector = &config.inspector;

    println!("=== Loupe Dry Run ===\n");

    println!("Inspector Configuration:");
    println!("  Fetch concurrency: {}", inspector.fetch_concurrency);
    println!("  Question concurrency: {}", inspector.question_concurrency);
    println!("  Fetch timeout: {}ms", inspector.fetch_timeout_ms);
    println!("  Max redirects: {}", inspector.max_redirects);
    println!(
        "  Jitter: {}-{}ms",
        inspector.jitter_min_ms, inspector.jitter_max_ms
    );
    println!("  Expansion cap: {}", inspector.expansion_cap);
    println!(
        "  Text length: {}-{} chars",
        inspector.min_text_length, inspector.max_text_length
    );
    println!("  Page budget: {}", inspector.max_pages);

    println!("\nUser Agents ({}):", config.user_agent.pool.len());
    for agent in &config.user_agent.pool {
        println!("  - {}", agent);
    }

    println!("\nOutput:");
    println!("  Runs directory: {}", config.output.runs_dir.display());

    println!("\nTopic: {}", topic);
    println!("Question: {}", question);
    println!("Seeds ({}):", seeds.len());
    for seed in seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main inspection run
async fn handle_inspect(
    config: Config,
    topic: &str,
    question: &str,
    seeds: &[String],
) -> anyhow::Result<()> {
    let store = Arc::new(RunStore::new(config.output.runs_dir.clone()));
    let run_dir = store
        .initialize(topic, config.inspector.max_pages)
        .context("failed to initialize run directory")?;

    let root = QuestionNode::root("q0", question, "cli");
    if !store.save_question_tree(std::slice::from_ref(&root)).await {
        tracing::warn!("Question tree snapshot was not saved");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping inspection");
                cancel.cancel();
            }
        });
    }

    let inspector = Inspector::new(&config, store.clone())?;
    let report = inspector
        .inspect(&root, seeds, &cancel, &|count| {
            tracing::info!("Progress: {} pages saved", count);
        })
        .await;

    store.flush().await;

    println!(
        "Saved {} pages ({} URLs attempted) to {}",
        report.pages_saved,
        report.fetch_attempts,
        run_dir.display()
    );
    Ok(())
}
