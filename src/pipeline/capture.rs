//! Capture role: raw events → segmenters → active segments.
//!
//! One [`CaptureSession`] owns the event source, all three segmenters and the
//! async writer. Every record goes through the writer, so per-category order
//! on disk matches flush order.
//!
//! Shutdown order:
//! 1. apply events already queued on the source channel
//! 2. flush the segmenters
//! 3. release the source's hooks
//! 4. seal every active segment into `pending/`
//! 5. join the writer so each write has completed or been reported
//!
//! `Drop` runs the same sequence if [`CaptureSession::stop`] was not called.

use crate::collector::{CollectorError, EventSource, RawEvent, TimedEvent};
use crate::core::records::{InputLog, LogCategory, WindowLog};
use crate::core::segmentation::{ClickRateSegmenter, FocusTracker, SentenceSegmenter};
use crate::store::layout::{self, QueueState};
use crate::store::{AsyncWriter, LogStore, StoreError, WriterReport};
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long the loop waits for an event before checking timers.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often interval timers and segment ages are checked.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("event source failed to start: {0}")]
    Collector(#[from] CollectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Capture settings derived from [`Config`](crate::config::Config).
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub keyboard: bool,
    pub mouse: bool,
    pub window: bool,
    pub click_interval: Duration,
    pub segment_max_age: Duration,
}

impl CaptureOptions {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            keyboard: config.sources.keyboard,
            mouse: config.sources.mouse,
            window: config.sources.window,
            click_interval: config.click_interval,
            segment_max_age: config.segment_max_age,
        }
    }
}

/// Totals for one capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub records_flushed: u64,
    pub segments_sealed: u64,
    pub segments_recovered: u64,
    pub writes: WriterReport,
}

#[derive(Debug)]
struct ActiveSegment {
    file_name: String,
    opened_at: DateTime<Utc>,
}

pub struct CaptureSession<S: EventSource> {
    source: S,
    store: LogStore,
    writer: Option<AsyncWriter>,
    keyboard: Option<SentenceSegmenter>,
    mouse: Option<ClickRateSegmenter>,
    window: Option<FocusTracker>,
    segments: BTreeMap<LogCategory, ActiveSegment>,
    last_opened: BTreeMap<LogCategory, DateTime<Utc>>,
    segment_max_age: chrono::Duration,
    transparency: SharedTransparencyLog,
    report: CaptureReport,
    pid: u32,
    started: bool,
    stopped: bool,
}

impl<S: EventSource> CaptureSession<S> {
    pub fn new(
        source: S,
        store: LogStore,
        options: &CaptureOptions,
        transparency: SharedTransparencyLog,
    ) -> Self {
        let writer = AsyncWriter::spawn(store.clone());
        Self {
            source,
            store,
            writer: Some(writer),
            keyboard: options.keyboard.then(SentenceSegmenter::new),
            mouse: options
                .mouse
                .then(|| ClickRateSegmenter::new(options.click_interval)),
            window: options.window.then(FocusTracker::new),
            segments: BTreeMap::new(),
            last_opened: BTreeMap::new(),
            segment_max_age: chrono::Duration::from_std(options.segment_max_age)
                .unwrap_or_else(|_| chrono::Duration::minutes(15)),
            transparency,
            report: CaptureReport::default(),
            pid: std::process::id(),
            started: false,
            stopped: false,
        }
    }

    /// Seal segments left in `active/` by a previous run, then register hooks.
    ///
    /// A hook registration failure is returned as-is; the session must not be
    /// run afterwards.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.report.segments_recovered = self.recover()?;
        self.source.start()?;
        self.started = true;
        tracing::info!(
            keyboard = self.keyboard.is_some(),
            mouse = self.mouse.is_some(),
            window = self.window.is_some(),
            "capture started"
        );
        Ok(())
    }

    /// Move every leftover active segment to `pending/`.
    ///
    /// Only one capture process runs per machine, so anything in `active/`
    /// at startup belongs to a run that did not shut down cleanly.
    pub fn recover(&self) -> Result<u64, StoreError> {
        let mut recovered = 0;
        for path in self.store.list(&layout::state_pattern(QueueState::Active))? {
            let name = layout::file_name(&path);
            match self
                .store
                .move_file(&path, &layout::queue_path(QueueState::Pending, name))
            {
                Ok(()) => {
                    tracing::info!(segment = name, "recovered segment from previous run");
                    recovered += 1;
                }
                Err(e) => tracing::error!(segment = name, error = %e, "could not recover segment"),
            }
        }
        Ok(recovered)
    }

    /// Pump events until `running` is cleared or the source disconnects.
    pub fn run(&mut self, running: &AtomicBool) {
        let receiver = self.source.receiver().clone();
        let mut last_tick = Instant::now();

        while running.load(Ordering::SeqCst) {
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("event source disconnected");
                    break;
                }
            }

            if last_tick.elapsed() >= TICK_INTERVAL {
                self.tick_at(Utc::now());
                last_tick = Instant::now();
            }
        }
    }

    /// Route one event to its segmenter.
    pub fn handle(&mut self, event: TimedEvent) {
        let at = event.timestamp;
        match event.event {
            RawEvent::Text(c) => {
                let Some(keyboard) = self.keyboard.as_mut() else {
                    return;
                };
                self.transparency.record_character();
                if let Some(log) = keyboard.on_char_at(c, at) {
                    self.write_input(log);
                }
            }
            RawEvent::Click => {
                if let Some(mouse) = self.mouse.as_mut() {
                    self.transparency.record_click();
                    mouse.on_click();
                }
            }
            RawEvent::Foreground(change) => {
                let Some(window) = self.window.as_mut() else {
                    return;
                };
                self.transparency.record_window_change();
                if let Some(log) = window.on_foreground_at(change, at) {
                    self.write_window(log);
                }
            }
        }
    }

    /// Fire the click-rate interval and seal segments that reached their age.
    pub fn tick_at(&mut self, now: DateTime<Utc>) {
        if let Some(log) = self.mouse.as_mut().and_then(|mouse| mouse.tick_at(now)) {
            self.write_input(log);
        }

        let expired: Vec<LogCategory> = self
            .segments
            .iter()
            .filter(|(_, segment)| now - segment.opened_at >= self.segment_max_age)
            .map(|(category, _)| *category)
            .collect();
        for category in expired {
            self.seal(category);
        }

        self.collect_failures();
    }

    /// Drain, flush, release hooks, seal and join the writer. Idempotent.
    pub fn stop(&mut self) -> CaptureReport {
        if self.stopped {
            return self.report;
        }
        self.stopped = true;
        if self.started {
            self.release();
        }

        if let Some(writer) = self.writer.take() {
            let failures = writer.failures().clone();
            self.report.writes = writer.shutdown();
            let failed = failures.try_iter().count() as u64;
            self.transparency.record_write_failures(failed);
        }

        tracing::info!(
            records = self.report.records_flushed,
            sealed = self.report.segments_sealed,
            failed_writes = self.report.writes.failed,
            "capture stopped"
        );
        self.report
    }

    /// Flush the segmenters, release the hooks and seal every segment.
    fn release(&mut self) {
        while let Some(event) = self.source.try_recv() {
            self.handle(event);
        }

        let now = Utc::now();
        if let Some(log) = self.keyboard.as_mut().and_then(|k| k.stop_at(now)) {
            self.write_input(log);
        }
        if let Some(log) = self.mouse.as_mut().and_then(|m| m.stop_at(now)) {
            self.write_input(log);
        }
        if let Some(window) = self.window.as_mut() {
            window.stop();
        }

        self.source.stop();

        let categories: Vec<LogCategory> = self.segments.keys().copied().collect();
        for category in categories {
            self.seal(category);
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Records handed to the writer so far.
    pub fn records_flushed(&self) -> u64 {
        self.report.records_flushed
    }

    fn write_input(&mut self, log: InputLog) {
        let category = log.category;
        self.write_line(category, &log, log.timestamp);
    }

    fn write_window(&mut self, log: WindowLog) {
        self.write_line(LogCategory::Window, &log, log.timestamp);
    }

    fn write_line<T: Serialize>(&mut self, category: LogCategory, record: &T, at: DateTime<Utc>) {
        let mut line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(%category, error = %e, "could not serialize record");
                return;
            }
        };
        line.push('\n');

        if !self.segments.contains_key(&category) {
            // File names carry millisecond precision; keep them unique per category
            let opened_at = match self.last_opened.get(&category) {
                Some(last) if at <= *last => *last + chrono::Duration::milliseconds(1),
                _ => at,
            };
            self.last_opened.insert(category, opened_at);
            self.segments.insert(
                category,
                ActiveSegment {
                    file_name: layout::segment_file_name(category, opened_at, self.pid),
                    opened_at,
                },
            );
        }
        let Some(segment) = self.segments.get(&category) else {
            return;
        };
        let path = layout::queue_path(QueueState::Active, &segment.file_name);

        if let Some(writer) = self.writer.as_ref() {
            writer.append(path, line);
            self.report.records_flushed += 1;
            self.transparency.record_flushed();
        }
    }

    fn seal(&mut self, category: LogCategory) {
        let Some(segment) = self.segments.remove(&category) else {
            return;
        };
        if let Some(writer) = self.writer.as_ref() {
            writer.move_file(
                layout::queue_path(QueueState::Active, &segment.file_name),
                layout::queue_path(QueueState::Pending, &segment.file_name),
            );
            self.report.segments_sealed += 1;
            tracing::debug!(segment = %segment.file_name, "segment sealed");
        }
    }

    fn collect_failures(&mut self) {
        if let Some(writer) = self.writer.as_ref() {
            let failed = writer.failures().try_iter().count() as u64;
            if failed > 0 {
                self.transparency.record_write_failures(failed);
            }
        }
    }
}

impl<S: EventSource> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{ChannelSource, ForegroundChange};
    use crate::transparency::create_shared_log;
    use tempfile::TempDir;

    fn options() -> CaptureOptions {
        CaptureOptions {
            keyboard: true,
            mouse: true,
            window: true,
            click_interval: Duration::from_secs(60),
            segment_max_age: Duration::from_secs(900),
        }
    }

    fn session(dir: &TempDir) -> (LogStore, CaptureSession<ChannelSource>) {
        let store = LogStore::open(dir.path()).unwrap();
        let session =
            CaptureSession::new(ChannelSource::new(), store.clone(), &options(), create_shared_log());
        (store, session)
    }

    fn text(c: char) -> TimedEvent {
        TimedEvent::now(RawEvent::Text(c))
    }

    #[test]
    fn test_stop_seals_segments() {
        let dir = TempDir::new().unwrap();
        let (store, mut session) = session(&dir);
        session.start().unwrap();

        for c in "hi. ".chars() {
            session.handle(text(c));
        }
        session.handle(TimedEvent::now(RawEvent::Foreground(
            ForegroundChange::new(5).with_title("Editor"),
        )));
        let report = session.stop();

        // keyboard sentence, window change, mouse sample on stop
        assert_eq!(report.records_flushed, 3);
        assert_eq!(report.segments_sealed, 3);
        assert_eq!(report.writes.failed, 0);
        assert!(store.list("active/*.jsonl").unwrap().is_empty());
        assert_eq!(store.list("pending/*.jsonl").unwrap().len(), 3);
        assert!(!session.source().is_running());
    }

    #[test]
    fn test_stop_flushes_partial_sentence_and_queued_events() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        let opts = CaptureOptions {
            mouse: false,
            window: false,
            ..options()
        };
        let source = ChannelSource::new();
        source.push_text("unfinished thought");
        let mut session = CaptureSession::new(source, store.clone(), &opts, create_shared_log());
        session.start().unwrap();
        session.stop();

        let pending = store.list("pending/keyboard-*.jsonl").unwrap();
        assert_eq!(pending.len(), 1);
        let content = store.read_all(&pending[0]);
        let log: InputLog = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(log.plain_text(), "unfinished thought");
    }

    #[test]
    fn test_disabled_sources_ignore_events() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        let opts = CaptureOptions {
            keyboard: false,
            mouse: false,
            ..options()
        };
        let mut session =
            CaptureSession::new(ChannelSource::new(), store.clone(), &opts, create_shared_log());
        session.start().unwrap();
        for c in "ignored. ".chars() {
            session.handle(text(c));
        }
        session.handle(TimedEvent::now(RawEvent::Click));
        let report = session.stop();
        assert_eq!(report.records_flushed, 0);
        assert!(store.list("pending/*.jsonl").unwrap().is_empty());
    }

    #[test]
    fn test_segment_rotation_by_age() {
        let dir = TempDir::new().unwrap();
        let (store, mut session) = session(&dir);
        session.start().unwrap();

        for c in "one.\n".chars() {
            session.handle(text(c));
        }
        // Far enough ahead to expire both the segment and the click interval
        session.tick_at(Utc::now() + chrono::Duration::hours(1));
        for c in "two.\n".chars() {
            session.handle(text(c));
        }
        session.stop();

        assert_eq!(store.list("pending/keyboard-*.jsonl").unwrap().len(), 2);
    }

    #[test]
    fn test_recover_leftover_active_segment() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        store
            .append("active/keyboard-20240101T000000000Z-1.jsonl", "{}\n")
            .unwrap();

        let (_, mut session) = session(&dir);
        session.start().unwrap();
        let report = session.stop();

        assert_eq!(report.segments_recovered, 1);
        assert!(store.exists("pending/keyboard-20240101T000000000Z-1.jsonl"));
    }

    #[test]
    fn test_hook_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        let mut session =
            CaptureSession::new(ChannelSource::failing(), store, &options(), create_shared_log());
        assert!(matches!(
            session.start(),
            Err(CaptureError::Collector(CollectorError::HookRegistration { .. }))
        ));
    }

    #[test]
    fn test_run_exits_when_flag_cleared() {
        let dir = TempDir::new().unwrap();
        let (_store, mut session) = session(&dir);
        session.start().unwrap();
        let running = AtomicBool::new(false);
        session.run(&running);
        session.stop();
    }
}
