//! Role selection and the scheduled trigger.
//!
//! One process runs one role. The scheduled trigger runs the processing and
//! aggregation roles as child processes of the same executable, one after the
//! other, each under the configured timeout.

use crate::collector::{Collector, CollectorConfig, EventSource};
use crate::config::{Config, ConfigError};
use crate::embedding::{create_service, EmbeddingError};
use crate::pipeline::{
    AggregateError, AggregateOutcome, AggregationWindow, Aggregator, CaptureError,
    CaptureOptions, CaptureReport, CaptureSession, ProcessReport, Processor,
};
use crate::store::{LogStore, StoreError};
use crate::transparency::{create_shared_log_with_persistence, SharedTransparencyLog};
use chrono::Utc;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Capture,
    Process,
    ScheduledTrigger,
    Aggregate,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Capture,
        Role::Process,
        Role::ScheduledTrigger,
        Role::Aggregate,
    ];

    /// Command-line token selecting this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Capture => "capture",
            Role::Process => "process",
            Role::ScheduledTrigger => "scheduled-trigger",
            Role::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

#[derive(Debug, Error)]
pub enum RoleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("no input source is enabled")]
    NoSources,
    #[error("cannot install shutdown handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("cannot start child roles: {0}")]
    Runtime(std::io::Error),
}

/// Per-invocation overrides on top of [`Config`].
#[derive(Debug, Clone, Default)]
pub struct RoleOptions {
    /// Config file forwarded to child roles.
    pub config_path: Option<PathBuf>,
    /// Overrides `processing.stale_claim_secs`.
    pub reclaim_stale_after: Option<Duration>,
    /// Overrides the default previous-day window.
    pub window: Option<AggregationWindow>,
}

#[derive(Debug)]
pub enum RoleReport {
    Capture(CaptureReport),
    Process(ProcessReport),
    Trigger(TriggerReport),
    Aggregate(AggregateOutcome),
}

impl RoleReport {
    /// Whether the role finished without unrecovered errors.
    pub fn succeeded(&self) -> bool {
        match self {
            RoleReport::Capture(report) => report.writes.failed == 0,
            RoleReport::Process(report) => report.failures.is_empty(),
            RoleReport::Trigger(report) => report.succeeded(),
            RoleReport::Aggregate(_) => true,
        }
    }
}

/// Run `role` to completion.
pub fn run_role(
    role: Role,
    config: &Config,
    options: &RoleOptions,
) -> Result<RoleReport, RoleError> {
    config.validate()?;
    tracing::info!(%role, "role starting");

    match role {
        Role::Capture => run_capture(config).map(RoleReport::Capture),
        Role::Process => {
            let threshold = options.reclaim_stale_after.or(config
                .processing
                .stale_claim_secs
                .map(Duration::from_secs));
            run_process(config, threshold).map(RoleReport::Process)
        }
        Role::Aggregate => {
            let window = match options.window {
                Some(window) => window,
                None => AggregationWindow::previous_day(config.tz()?, Utc::now())?,
            };
            run_aggregate(config, window).map(RoleReport::Aggregate)
        }
        Role::ScheduledTrigger => {
            let child = ChildCommand::current_exe(options.config_path.as_deref())
                .map_err(RoleError::Runtime)?;
            let runtime = tokio::runtime::Runtime::new().map_err(RoleError::Runtime)?;
            let report = runtime.block_on(run_trigger(&child, config.trigger_timeout));
            Ok(RoleReport::Trigger(report))
        }
    }
}

fn run_capture(config: &Config) -> Result<CaptureReport, RoleError> {
    if !config.sources.any_enabled() {
        return Err(RoleError::NoSources);
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    // SIGINT, SIGTERM and SIGHUP; console close, logoff and shutdown on Windows
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })?;

    let collector = Collector::new(CollectorConfig {
        capture_keyboard: config.sources.keyboard,
        capture_mouse: config.sources.mouse,
        capture_window: config.sources.window,
    });
    let transparency = create_shared_log_with_persistence(config.transparency_path());
    let report = capture_with(collector, config, transparency.clone(), &running)?;
    println!();
    println!("{}", transparency.summary());
    Ok(report)
}

/// Run a capture session on `source` until `running` is cleared.
pub fn capture_with<S: EventSource>(
    source: S,
    config: &Config,
    transparency: SharedTransparencyLog,
    running: &AtomicBool,
) -> Result<CaptureReport, RoleError> {
    let store = LogStore::open(config.store_path())?;
    let mut session = CaptureSession::new(
        source,
        store,
        &CaptureOptions::from_config(config),
        transparency.clone(),
    );
    session.start()?;
    session.run(running);
    let report = session.stop();

    if let Err(e) = transparency.save() {
        tracing::warn!(error = %e, "could not save transparency stats");
    }
    Ok(report)
}

/// Reclaim stale claims if asked, then drain every configured category.
pub fn run_process(
    config: &Config,
    reclaim_after: Option<Duration>,
) -> Result<ProcessReport, RoleError> {
    let store = LogStore::open(config.store_path())?;
    let service = create_service(&config.embedding)?;
    let processor = Processor::new(&store, service.as_ref(), config.processing.batch_size);

    let reclaimed = match reclaim_after {
        Some(threshold) => processor.reclaim_stale(threshold)?,
        None => 0,
    };
    let mut report = processor.run(&config.processing.categories)?;
    report.reclaimed = reclaimed;
    Ok(report)
}

pub fn run_aggregate(
    config: &Config,
    window: AggregationWindow,
) -> Result<AggregateOutcome, RoleError> {
    let store = LogStore::open(config.store_path())?;
    Ok(Aggregator::for_this_device(&store).aggregate(window)?)
}

/// How the trigger launches a child role.
#[derive(Debug, Clone)]
pub struct ChildCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ChildCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// This executable, forwarding `--config` when one was given.
    pub fn current_exe(config_path: Option<&Path>) -> std::io::Result<Self> {
        let mut command = Self::new(std::env::current_exe()?);
        if let Some(path) = config_path {
            command = command.arg("--config").arg(path);
        }
        Ok(command)
    }

    /// Argument placed before the role token.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self, role: Role) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).arg(role.as_str()).kill_on_drop(true);
        command
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    /// Exit code, if the child was not killed by a signal.
    Failed(Option<i32>),
    TimedOut,
    SpawnFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerStep {
    pub role: Role,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerReport {
    pub steps: Vec<TriggerStep>,
}

impl TriggerReport {
    pub fn succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.status == StepStatus::Succeeded)
    }
}

/// Run processing, then aggregation, each bounded by `limit`.
///
/// Aggregation runs even when processing failed; it summarizes whatever
/// embeddings exist.
pub async fn run_trigger(child: &ChildCommand, limit: Duration) -> TriggerReport {
    let mut report = TriggerReport::default();
    for role in [Role::Process, Role::Aggregate] {
        let status = run_step(child, role, limit).await;
        match &status {
            StepStatus::Succeeded => tracing::info!(%role, "scheduled step finished"),
            StepStatus::Failed(code) => tracing::error!(%role, ?code, "scheduled step failed"),
            StepStatus::TimedOut => tracing::error!(
                %role,
                limit_secs = limit.as_secs(),
                "scheduled step timed out and was killed"
            ),
            StepStatus::SpawnFailed(e) => {
                tracing::error!(%role, error = %e, "could not start scheduled step")
            }
        }
        report.steps.push(TriggerStep { role, status });
    }
    report
}

async fn run_step(child: &ChildCommand, role: Role, limit: Duration) -> StepStatus {
    let mut process = match child.command(role).spawn() {
        Ok(process) => process,
        Err(e) => return StepStatus::SpawnFailed(e.to_string()),
    };

    match tokio::time::timeout(limit, process.wait()).await {
        Ok(Ok(status)) if status.success() => StepStatus::Succeeded,
        Ok(Ok(status)) => StepStatus::Failed(status.code()),
        Ok(Err(e)) => StepStatus::SpawnFailed(e.to_string()),
        Err(_) => {
            if let Err(e) = process.kill().await {
                tracing::warn!(%role, error = %e, "could not kill timed-out step");
            }
            StepStatus::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tokens() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!("scheduled-trigger".parse::<Role>(), Ok(Role::ScheduledTrigger));
        assert!("Capture".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_trigger_report_success() {
        let mut report = TriggerReport::default();
        assert!(report.succeeded());
        report.steps.push(TriggerStep {
            role: Role::Process,
            status: StepStatus::TimedOut,
        });
        assert!(!report.succeeded());
    }

    #[test]
    fn test_current_exe_forwards_config() {
        let child = ChildCommand::current_exe(Some(Path::new("/tmp/c.json"))).unwrap();
        assert_eq!(child.args, vec![OsString::from("--config"), OsString::from("/tmp/c.json")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trigger_runs_steps_in_order() {
        // Exits 0 only for the processing step
        let child = ChildCommand::new("sh")
            .arg("-c")
            .arg("test \"$1\" = process")
            .arg("sh");
        let report = run_trigger(&child, Duration::from_secs(10)).await;

        assert_eq!(
            report.steps,
            vec![
                TriggerStep {
                    role: Role::Process,
                    status: StepStatus::Succeeded
                },
                TriggerStep {
                    role: Role::Aggregate,
                    status: StepStatus::Failed(Some(1))
                },
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trigger_kills_slow_steps() {
        let child = ChildCommand::new("sh").arg("-c").arg("sleep 5").arg("sh");
        let report = run_trigger(&child, Duration::from_millis(200)).await;
        assert!(report
            .steps
            .iter()
            .all(|step| step.status == StepStatus::TimedOut));
    }

    #[tokio::test]
    async fn test_missing_program_reported() {
        let child = ChildCommand::new("/nonexistent/synheart-activity-child");
        let report = run_trigger(&child, Duration::from_secs(1)).await;
        assert!(matches!(report.steps[0].status, StepStatus::SpawnFailed(_)));
        assert_eq!(report.steps.len(), 2);
    }
}
