//! Aggregation role: embeddings in a time window → one summary artifact.
//!
//! The artifact is a pure function of the embeddings present in the window.
//! Records are sorted before any arithmetic and maps are ordered, so running
//! twice over unchanged input produces byte-identical files.

use crate::core::records::{AggregateArtifact, CategorySummary, EmbeddingRecord, LogCategory};
use crate::core::segmentation::parse_rate;
use crate::embedding::vector_norm;
use crate::store::layout;
use crate::store::{LogStore, StoreError};
use chrono::{DateTime, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("aggregation window is empty: {start} is not before {end}")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("cannot resolve local midnight of {0}")]
    NoMidnight(NaiveDate),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot serialize aggregate: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AggregationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AggregateError> {
        if start >= end {
            return Err(AggregateError::EmptyWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// The full local day before `now` in `tz`.
    pub fn previous_day(tz: Tz, now: DateTime<Utc>) -> Result<Self, AggregateError> {
        let today = now.with_timezone(&tz).date_naive();
        let yesterday = today.pred_opt().ok_or(AggregateError::NoMidnight(today))?;
        Self::new(local_midnight(tz, yesterday)?, local_midnight(tz, today)?)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// First instant of `date` in `tz`, skipping forward over a DST gap.
fn local_midnight(tz: Tz, date: NaiveDate) -> Result<DateTime<Utc>, AggregateError> {
    for hour in 0..3 {
        let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
            break;
        };
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(at) => return Ok(at.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => continue,
        }
    }
    Err(AggregateError::NoMidnight(date))
}

/// Where an aggregate was written and what it contains.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub path: String,
    pub artifact: AggregateArtifact,
}

pub struct Aggregator<'a> {
    store: &'a LogStore,
    device: String,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a LogStore, device: impl Into<String>) -> Self {
        Self {
            store,
            device: device.into(),
        }
    }

    /// An aggregator labelled with this machine's host name.
    pub fn for_this_device(store: &'a LogStore) -> Self {
        Self::new(store, device_name())
    }

    /// Summarize the window and replace its artifact file.
    pub fn aggregate(&self, window: AggregationWindow) -> Result<AggregateOutcome, AggregateError> {
        let records = self.collect(window)?;
        let artifact = summarize(&records, window, &self.device);

        let mut json = serde_json::to_string_pretty(&artifact)?;
        json.push('\n');
        let path = layout::aggregate_path(window.start, window.end);
        self.store.overwrite(&path, &json)?;

        tracing::info!(
            path = %path,
            records = artifact.total_records,
            "aggregate written"
        );
        Ok(AggregateOutcome { path, artifact })
    }

    /// Every embedding record timestamped inside `window`.
    pub fn collect(&self, window: AggregationWindow) -> Result<Vec<EmbeddingRecord>, StoreError> {
        let mut records = Vec::new();
        for file in self.store.list(&layout::embeddings_pattern())? {
            let Some(content) = self.store.try_read(&file)? else {
                continue;
            };
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<EmbeddingRecord>(line) {
                    Ok(record) if window.contains(record.timestamp) => records.push(record),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(file = %file, error = %e, "skipping unparseable embedding"),
                }
            }
        }
        Ok(records)
    }
}

/// Host name for the artifact's `device` field.
pub fn device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the artifact for `records`, ignoring input order.
pub fn summarize(
    records: &[EmbeddingRecord],
    window: AggregationWindow,
    device: &str,
) -> AggregateArtifact {
    let mut by_category: BTreeMap<LogCategory, Vec<&EmbeddingRecord>> = BTreeMap::new();
    for record in records {
        by_category.entry(record.category).or_default().push(record);
    }

    let mut counts = BTreeMap::new();
    let mut categories = BTreeMap::new();
    for (category, mut group) in by_category {
        group.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));
        counts.insert(category, group.len() as u64);
        categories.insert(category, summarize_category(category, &group));
    }

    AggregateArtifact {
        period_start: window.start,
        period_end: window.end,
        device: device.to_string(),
        total_records: records.len() as u64,
        counts,
        categories,
    }
}

fn summarize_category(category: LogCategory, group: &[&EmbeddingRecord]) -> CategorySummary {
    let norms: Vec<f64> = group.iter().map(|r| vector_norm(&r.vector)).collect();
    let models: BTreeSet<&str> = group.iter().map(|r| r.model.as_str()).collect();

    let (mean_click_rate, max_click_rate) = if category == LogCategory::Mouse {
        let rates: Vec<f64> = group
            .iter()
            .filter_map(|r| parse_rate(&r.plain_source_text()))
            .collect();
        if rates.is_empty() {
            (None, None)
        } else {
            let max = rates.iter().copied().fold(f64::MIN, f64::max);
            (Some(rates.iter().mean()), Some(max))
        }
    } else {
        (None, None)
    };

    CategorySummary {
        count: group.len() as u64,
        first_timestamp: group.first().map(|r| r.timestamp),
        last_timestamp: group.last().map(|r| r.timestamp),
        models: models.into_iter().map(str::to_string).collect(),
        mean_vector_norm: if norms.is_empty() { 0.0 } else { norms.iter().mean() },
        // Sample standard deviation is undefined for a single record
        vector_norm_std_dev: if norms.len() < 2 {
            0.0
        } else {
            norms.iter().std_dev()
        },
        centroid: centroid(group),
        mean_click_rate,
        max_click_rate,
    }
}

/// Element-wise mean, or `None` when vectors differ in length.
fn centroid(group: &[&EmbeddingRecord]) -> Option<Vec<f32>> {
    let dims = group.first()?.vector.len();
    if dims == 0 || group.iter().any(|r| r.vector.len() != dims) {
        return None;
    }
    let mut sums = vec![0.0f64; dims];
    for record in group {
        for (sum, value) in sums.iter_mut().zip(&record.vector) {
            *sum += f64::from(*value);
        }
    }
    let n = group.len() as f64;
    Some(sums.into_iter().map(|sum| (sum / n) as f32).collect())
}
