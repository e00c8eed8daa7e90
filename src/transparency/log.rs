//! Transparency log.
//!
//! Tracks how much was captured, never what. Counters persist
//! across runs so `status` can show cumulative totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Collection and processing counters for the current run.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of typed characters seen
    characters: AtomicU64,
    /// Number of mouse clicks seen
    clicks: AtomicU64,
    /// Number of foreground changes seen
    window_changes: AtomicU64,
    /// Number of records handed to the store
    records_flushed: AtomicU64,
    /// Number of abandoned writes
    write_failures: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            characters: AtomicU64::new(0),
            clicks: AtomicU64::new(0),
            window_changes: AtomicU64::new(0),
            records_flushed: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log that continues from persisted totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    pub fn record_character(&self) {
        self.characters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_click(&self) {
        self.clicks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_change(&self) {
        self.window_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flushed(&self) {
        self.records_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failures(&self, count: u64) {
        self.write_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            characters: self.characters.load(Ordering::Relaxed),
            clicks: self.clicks.load(Ordering::Relaxed),
            window_changes: self.window_changes.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Characters typed: {}\n\
             - Mouse clicks: {}\n\
             - Window changes: {}\n\
             - Records written: {}\n\
             - Failed writes: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - Typed text is obfuscated at rest\n\
             - Individual clicks and cursor positions are never stored\n\
             - Nothing leaves this machine unless a remote embedding endpoint is configured",
            stats.characters,
            stats.clicks,
            stats.window_changes,
            stats.records_flushed,
            stats.write_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                characters: stats.characters,
                clicks: stats.clicks,
                window_changes: stats.window_changes,
                records_flushed: stats.records_flushed,
                write_failures: stats.write_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            // Another role may be reading; replace atomically
            let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, path)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = read_persisted(path)?;

                self.characters
                    .store(persisted.characters, Ordering::Relaxed);
                self.clicks.store(persisted.clicks, Ordering::Relaxed);
                self.window_changes
                    .store(persisted.window_changes, Ordering::Relaxed);
                self.records_flushed
                    .store(persisted.records_flushed, Ordering::Relaxed);
                self.write_failures
                    .store(persisted.write_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub characters: u64,
    pub clicks: u64,
    pub window_changes: u64,
    pub records_flushed: u64,
    pub write_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    #[serde(default)]
    pub characters: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub window_changes: u64,
    #[serde(default)]
    pub records_flushed: u64,
    #[serde(default)]
    pub write_failures: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read persisted totals without constructing a log.
pub fn read_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
