//! Processing role: pending segments → embeddings → completed.
//!
//! A segment is claimed by renaming it from `pending/` to `inprogress/`. The
//! rename is the only coordination between processors: whoever loses the race
//! sees `NotFound` and moves on. The embeddings file is written in one atomic
//! replace before the segment moves to `completed/`, so a crash at any point
//! leaves either no output or complete output for a claimed segment.

use crate::core::records::{CapturedRecord, EmbeddingRecord, LogCategory};
use crate::embedding::{EmbeddingError, EmbeddingService};
use crate::store::layout::{self, QueueState};
use crate::store::{LogStore, StoreError};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot tell the category of segment {0}")]
    UnknownCategory(String),
    #[error("embedding failed for {file}: {source}")]
    Embedding {
        file: String,
        source: EmbeddingError,
    },
    #[error("cannot serialize embedding record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result of trying to claim one pending segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The segment now lives at this `inprogress/` path.
    Claimed(String),
    /// Another processor got there first.
    Conflict,
}

/// A segment whose processing failed; it stays in `inprogress/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub claimed: u64,
    pub conflicts: u64,
    pub completed: u64,
    pub records_embedded: u64,
    pub skipped_lines: u64,
    pub reclaimed: u64,
    pub failures: Vec<FileFailure>,
}

/// Outcome of processing one claimed segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentOutcome {
    pub embedded: u64,
    pub skipped_lines: u64,
}

pub struct Processor<'a> {
    store: &'a LogStore,
    service: &'a dyn EmbeddingService,
    batch_size: usize,
}

impl<'a> Processor<'a> {
    pub fn new(store: &'a LogStore, service: &'a dyn EmbeddingService, batch_size: usize) -> Self {
        Self {
            store,
            service,
            batch_size: batch_size.max(1),
        }
    }

    /// Drain `pending/` for each category in turn.
    ///
    /// Per-segment failures are collected in the report; only store errors
    /// that prevent listing the queue abort the run.
    pub fn run(&self, categories: &[LogCategory]) -> Result<ProcessReport, StoreError> {
        let mut report = ProcessReport::default();
        for &category in categories {
            self.process_category(category, &mut report)?;
        }
        tracing::info!(
            claimed = report.claimed,
            completed = report.completed,
            embedded = report.records_embedded,
            conflicts = report.conflicts,
            failed = report.failures.len(),
            "processing run finished"
        );
        Ok(report)
    }

    pub fn process_category(
        &self,
        category: LogCategory,
        report: &mut ProcessReport,
    ) -> Result<(), StoreError> {
        let pattern = layout::category_pattern(QueueState::Pending, category);
        for pending in self.store.list(&pattern)? {
            let claimed = match self.claim(&pending) {
                Ok(ClaimOutcome::Claimed(path)) => path,
                Ok(ClaimOutcome::Conflict) => {
                    report.conflicts += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(segment = %pending, error = %e, "claim failed");
                    report.failures.push(FileFailure {
                        file: pending,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            report.claimed += 1;

            match self.process_claimed(&claimed) {
                Ok(outcome) => {
                    report.completed += 1;
                    report.records_embedded += outcome.embedded;
                    report.skipped_lines += outcome.skipped_lines;
                }
                Err(e) => {
                    tracing::error!(segment = %claimed, error = %e, "segment left in progress");
                    report.failures.push(FileFailure {
                        file: claimed,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Move a pending segment to `inprogress/` and stamp the claim time.
    pub fn claim(&self, pending: &str) -> Result<ClaimOutcome, StoreError> {
        let name = layout::file_name(pending);
        let target = layout::queue_path(QueueState::InProgress, name);

        match self.store.move_file(pending, &target) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) | Err(StoreError::AlreadyExists(_)) => {
                tracing::debug!(segment = name, "segment claimed by another processor");
                return Ok(ClaimOutcome::Conflict);
            }
            Err(e) => return Err(e),
        }

        // Staleness is measured from the claim, not from the last capture write
        if let Err(e) = self.store.touch(&target) {
            tracing::warn!(segment = name, error = %e, "could not stamp claim time");
        }
        tracing::debug!(segment = name, "segment claimed");
        Ok(ClaimOutcome::Claimed(target))
    }

    /// Embed every record of a claimed segment and complete it.
    pub fn process_claimed(&self, inprogress: &str) -> Result<SegmentOutcome, ProcessError> {
        let name = layout::file_name(inprogress);
        let category =
            layout::category_of(name).ok_or_else(|| ProcessError::UnknownCategory(name.into()))?;
        let content = self
            .store
            .try_read(inprogress)?
            .ok_or_else(|| StoreError::NotFound(inprogress.to_string()))?;

        let mut outcome = SegmentOutcome::default();
        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match CapturedRecord::parse(category, line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(segment = name, line = index + 1, error = %e, "skipping unparseable record");
                    outcome.skipped_lines += 1;
                }
            }
        }

        if !records.is_empty() {
            let texts: Vec<String> = records.iter().map(CapturedRecord::plain_text).collect();
            let vectors = self
                .embed_all(&texts)
                .map_err(|source| ProcessError::Embedding {
                    file: name.to_string(),
                    source,
                })?;

            let model = self.service.model_name();
            let mut output = String::new();
            for (record, vector) in records.iter().zip(vectors) {
                let embedding = EmbeddingRecord::from_source(record, vector, model);
                output.push_str(&serde_json::to_string(&embedding)?);
                output.push('\n');
            }
            self.store.overwrite(&layout::embeddings_path(name), &output)?;
            outcome.embedded = records.len() as u64;
        }

        self.store
            .move_file(inprogress, &layout::queue_path(QueueState::Completed, name))?;
        tracing::debug!(segment = name, embedded = outcome.embedded, "segment completed");
        Ok(outcome)
    }

    /// Return claims older than `threshold` to `pending/`.
    pub fn reclaim_stale(&self, threshold: Duration) -> Result<u64, StoreError> {
        let now = SystemTime::now();
        let mut reclaimed = 0;

        for path in self.store.list(&layout::state_pattern(QueueState::InProgress))? {
            let modified = match self.store.modified(&path) {
                Ok(modified) => modified,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            // A clock step backwards makes the claim look fresh
            let age = now.duration_since(modified).unwrap_or_default();
            if age < threshold {
                continue;
            }

            let name = layout::file_name(&path);
            match self
                .store
                .move_file(&path, &layout::queue_path(QueueState::Pending, name))
            {
                Ok(()) => {
                    tracing::info!(segment = name, age_secs = age.as_secs(), "reclaimed stale claim");
                    reclaimed += 1;
                }
                Err(StoreError::NotFound(_)) | Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reclaimed)
    }

    /// Embed `texts` in input order, batching when the service supports it.
    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = if self.service.supports_batch() {
            let mut vectors = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(self.batch_size) {
                let batch = self.service.embed_batch(chunk)?;
                if batch.len() != chunk.len() {
                    return Err(EmbeddingError::PartialBatch {
                        expected: chunk.len(),
                        got: batch.len(),
                    });
                }
                vectors.extend(batch);
            }
            vectors
        } else {
            texts
                .iter()
                .map(|text| self.service.embed(text))
                .collect::<Result<Vec<_>, _>>()?
        };

        let expected = self.service.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                model: self.service.model_name().to_string(),
                expected,
                got: bad.len(),
            });
        }
        Ok(vectors)
    }
}
