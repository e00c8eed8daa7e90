//! Synheart Activity Pipeline CLI
//!
//! One subcommand per role, plus status and inspection commands.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use synheart_activity_pipeline::{
    config::{Config, SourceConfig},
    launch::{run_role, Role, RoleOptions, RoleReport, StepStatus},
    pipeline::AggregationWindow,
    store::{layout, LogStore, QueueState},
    transparency::read_persisted,
    PRIVACY_DECLARATION, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synheart-activity")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Local activity capture and embedding pipeline", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture keyboard, mouse and window activity until interrupted
    Capture {
        /// Input sources to capture (keyboard, mouse, window, or all)
        #[arg(long)]
        sources: Option<String>,
    },

    /// Embed every pending segment
    Process {
        /// Return in-progress claims older than this many seconds to pending
        #[arg(long, value_name = "SECS")]
        reclaim_stale_after: Option<u64>,
    },

    /// Run process then aggregate as child processes
    ScheduledTrigger,

    /// Summarize embeddings for a time window (default: yesterday)
    Aggregate {
        /// Window start (RFC 3339)
        #[arg(long, requires = "end")]
        start: Option<DateTime<Utc>>,

        /// Window end, exclusive (RFC 3339)
        #[arg(long, requires = "start")]
        end: Option<DateTime<Utc>>,
    },

    /// Show queue depths and collection statistics
    Status,

    /// Show configuration
    Config,

    /// Display privacy declaration
    Privacy,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading configuration")?;

    let mut options = RoleOptions {
        config_path: cli.config.clone(),
        ..RoleOptions::default()
    };

    let role = match cli.command {
        Commands::Capture { sources } => {
            if let Some(sources) = sources {
                config.sources = SourceConfig::from_csv(&sources);
            }
            Role::Capture
        }
        Commands::Process {
            reclaim_stale_after,
        } => {
            options.reclaim_stale_after = reclaim_stale_after.map(Duration::from_secs);
            Role::Process
        }
        Commands::ScheduledTrigger => Role::ScheduledTrigger,
        Commands::Aggregate { start, end } => {
            if let (Some(start), Some(end)) = (start, end) {
                options.window = Some(AggregationWindow::new(start, end)?);
            }
            Role::Aggregate
        }
        Commands::Status => return cmd_status(&config),
        Commands::Config => return cmd_config(&config, cli.config.as_deref()),
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            return Ok(ExitCode::SUCCESS);
        }
    };

    if role == Role::Capture {
        println!("Synheart Activity Pipeline v{VERSION}");
        println!("  Keyboard: {}", enabled(config.sources.keyboard));
        println!("  Mouse: {}", enabled(config.sources.mouse));
        println!("  Window: {}", enabled(config.sources.window));
        println!();
        println!("Press Ctrl+C to stop");
        println!();
    }

    let report = run_role(role, &config, &options).with_context(|| format!("{role} failed"))?;
    print_report(&report);
    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn print_report(report: &RoleReport) {
    match report {
        RoleReport::Capture(report) => {
            println!();
            println!("Capture stopped:");
            println!("  Records written: {}", report.records_flushed);
            println!("  Segments sealed: {}", report.segments_sealed);
            println!("  Segments recovered: {}", report.segments_recovered);
            println!("  Failed writes: {}", report.writes.failed);
        }
        RoleReport::Process(report) => {
            println!("Processed {} segment(s):", report.claimed);
            println!("  Completed: {}", report.completed);
            println!("  Records embedded: {}", report.records_embedded);
            println!("  Lines skipped: {}", report.skipped_lines);
            println!("  Claimed elsewhere: {}", report.conflicts);
            if report.reclaimed > 0 {
                println!("  Stale claims returned: {}", report.reclaimed);
            }
            for failure in &report.failures {
                println!("  FAILED {}: {}", failure.file, failure.error);
            }
        }
        RoleReport::Trigger(report) => {
            for step in &report.steps {
                let status = match &step.status {
                    StepStatus::Succeeded => "ok".to_string(),
                    StepStatus::Failed(Some(code)) => format!("failed (exit {code})"),
                    StepStatus::Failed(None) => "failed (killed)".to_string(),
                    StepStatus::TimedOut => "timed out".to_string(),
                    StepStatus::SpawnFailed(e) => format!("could not start: {e}"),
                };
                println!("  {}: {status}", step.role);
            }
        }
        RoleReport::Aggregate(outcome) => {
            let artifact = &outcome.artifact;
            println!(
                "Aggregated {} record(s) for {} .. {}",
                artifact.total_records,
                artifact.period_start.to_rfc3339(),
                artifact.period_end.to_rfc3339()
            );
            for (category, count) in &artifact.counts {
                println!("  {category}: {count}");
            }
            println!("Written to {}", outcome.path);
        }
    }
}

fn cmd_status(config: &Config) -> anyhow::Result<ExitCode> {
    println!("Synheart Activity Pipeline Status");
    println!("=================================");
    println!();

    println!("Configuration:");
    println!("  Keyboard capture: {}", enabled(config.sources.keyboard));
    println!("  Mouse capture: {}", enabled(config.sources.mouse));
    println!("  Window capture: {}", enabled(config.sources.window));
    println!("  Click interval: {}s", config.click_interval.as_secs());
    println!("  Embedding model: {}", config.embedding.model);
    println!("  Store: {:?}", config.store_path());
    println!();

    let store = LogStore::open(config.store_path()).context("opening log store")?;
    println!("Queue:");
    for state in QueueState::ALL {
        let count = store.list(&layout::state_pattern(state))?.len();
        println!("  {}: {count}", state.dir());
    }
    let embeddings = store.list(&layout::embeddings_pattern())?.len();
    println!("  embedding files: {embeddings}");
    println!();

    let stats_path = config.transparency_path();
    match read_persisted(&stats_path) {
        Ok(stats) => {
            println!("Cumulative Statistics:");
            println!("  Characters typed: {}", stats.characters);
            println!("  Mouse clicks: {}", stats.clicks);
            println!("  Window changes: {}", stats.window_changes);
            println!("  Records written: {}", stats.records_flushed);
            println!("  Failed writes: {}", stats.write_failures);
            println!("  Last updated: {}", stats.last_updated.to_rfc3339());
        }
        Err(_) => println!("No previous session data found."),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(config: &Config, path: Option<&Path>) -> anyhow::Result<ExitCode> {
    println!("Configuration");
    println!("=============");
    println!();
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    println!("Config file: {path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(ExitCode::SUCCESS)
}
