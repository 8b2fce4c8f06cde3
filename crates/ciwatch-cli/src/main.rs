use anyhow::{bail, Context, Result};
use chrono::Utc;
use ciwatch_core::config::TrackerConfig;
use ciwatch_github::{resolve_token, GithubClient};
use ciwatch_ingest::{Direction, IngestionEngine};
use ciwatch_spike::{SpikeConfig, SpikeDetector, SpikeReport};
use ciwatch_storage::{load_entries, CursorStore, RecordStore};
use clap::{Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ciwatch")]
#[command(about = "Tracks CI workflow durations and alerts on spikes", long_about = None)]
struct Cli {
    /// Optional config file; built-in defaults are used when absent.
    #[arg(long, global = true, default_value = "ciwatch.json")]
    config: PathBuf,
    /// Dataset file.
    #[arg(long, global = true, default_value = "data.json")]
    data: PathBuf,
    /// Backfill cursor file.
    #[arg(long, global = true, default_value = "state.json")]
    state: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest workflow run durations into the dataset
    Fetch {
        /// Only pick up the current month instead of backfilling older history
        #[arg(long)]
        newer: bool,
    },
    /// Evaluate the dataset for duration spikes
    Check,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Fetch { newer } => fetch(&config, &cli.data, &cli.state, newer),
        Commands::Check => check(&config, &cli.data),
    }
}

fn load_config(path: &Path) -> Result<TrackerConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using built-in defaults");
        return Ok(TrackerConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn fetch(config: &TrackerConfig, data: &Path, state: &Path, newer: bool) -> Result<()> {
    let direction = if newer {
        Direction::Newer
    } else {
        Direction::Older
    };
    info!(
        mode = if newer { "newer" } else { "older" },
        branches = %config.branches.join(", "),
        categories = %config
            .categories
            .iter()
            .map(|c| c.label.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        "starting ingestion"
    );

    let token = resolve_token().context("could not resolve a GitHub token")?;
    let client = GithubClient::new(&config.owner, &config.repo, config.workflow_id, token);
    let records = RecordStore::open(data).context("could not open record store")?;
    let cursor = CursorStore::new(state);

    let engine = IngestionEngine::new(&client, config, &records, &cursor);
    let report = engine
        .ingest(direction, Utc::now())
        .context("ingestion failed")?;

    info!(
        months = report.months_processed,
        pages = report.pages_fetched,
        runs = report.runs_seen,
        added = report.entries_added,
        failed_runs = report.runs_failed,
        "fetch complete"
    );
    Ok(())
}

fn check(config: &TrackerConfig, data: &Path) -> Result<()> {
    if !data.exists() {
        bail!("dataset {} not found; run `ciwatch fetch` first", data.display());
    }
    let entries = load_entries(data).context("could not read dataset")?;

    let detector = SpikeDetector::new(SpikeConfig {
        recent_runs: config.recent_runs,
        baseline_days: config.baseline_days,
        threshold: config.spike_threshold,
    });
    let report = detector.detect(&config.categories, &entries, Utc::now());

    append_github_output(&report).context("could not write GITHUB_OUTPUT")?;

    if report.spike_detected() {
        println!("=== SPIKES DETECTED ===");
        println!("{}", report.details());
        std::process::exit(1);
    }

    println!("All categories within normal range.");
    Ok(())
}

fn append_github_output(report: &SpikeReport) -> Result<()> {
    let Ok(path) = std::env::var("GITHUB_OUTPUT") else {
        return Ok(());
    };
    if path.trim().is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {path}"))?;
    file.write_all(render_github_output(report).as_bytes())?;
    Ok(())
}

fn render_github_output(report: &SpikeReport) -> String {
    if report.spike_detected() {
        format!(
            "spike_detected=true\nspike_details<<EOF\n{}\nEOF\n",
            report.details()
        )
    } else {
        "spike_detected=false\n".to_string()
    }
}
