//! Naming convention of the on-disk queue.
//!
//! ```text
//! active/<category>-<started>-<pid>.jsonl     appended by capture
//! pending/<same name>                         sealed, waiting
//! inprogress/<same name>                      claimed by one processing run
//! completed/<same name>                       embedded
//! embeddings/<stem>.embeddings.jsonl         embedding records of one segment
//! aggregates/<start>_<end>.json              aggregate artifact of one window
//! ```
//!
//! A segment keeps its file name for its whole life; only the directory
//! changes, and every change is a single rename.

use crate::core::records::LogCategory;
use chrono::{DateTime, Utc};

pub const EMBEDDINGS_DIR: &str = "embeddings";
pub const AGGREGATES_DIR: &str = "aggregates";

const SEGMENT_EXT: &str = ".jsonl";
const EMBEDDINGS_SUFFIX: &str = ".embeddings.jsonl";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Lifecycle stage of a captured segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    Active,
    Pending,
    InProgress,
    Completed,
}

impl QueueState {
    pub const ALL: [QueueState; 4] = [
        QueueState::Active,
        QueueState::Pending,
        QueueState::InProgress,
        QueueState::Completed,
    ];

    pub fn dir(&self) -> &'static str {
        match self {
            QueueState::Active => "active",
            QueueState::Pending => "pending",
            QueueState::InProgress => "inprogress",
            QueueState::Completed => "completed",
        }
    }
}

/// File name for a new segment.
pub fn segment_file_name(category: LogCategory, started: DateTime<Utc>, pid: u32) -> String {
    format!(
        "{}-{}-{}{}",
        category.as_str(),
        started.format(STAMP_FORMAT),
        pid,
        SEGMENT_EXT
    )
}

/// Store-relative path of a segment in a given state.
pub fn queue_path(state: QueueState, file_name: &str) -> String {
    format!("{}/{}", state.dir(), file_name)
}

/// Glob matching every segment of `category` in `state`.
pub fn category_pattern(state: QueueState, category: LogCategory) -> String {
    format!("{}/{}-*{}", state.dir(), category.as_str(), SEGMENT_EXT)
}

/// Glob matching every segment in `state`.
pub fn state_pattern(state: QueueState) -> String {
    format!("{}/*{}", state.dir(), SEGMENT_EXT)
}

/// Final path component of a store-relative path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Category encoded in a segment file name.
pub fn category_of(file_name: &str) -> Option<LogCategory> {
    let prefix = file_name.split('-').next()?;
    prefix.parse().ok()
}

/// Where the embeddings of a segment are written.
pub fn embeddings_path(segment_file_name: &str) -> String {
    let stem = segment_file_name
        .strip_suffix(SEGMENT_EXT)
        .unwrap_or(segment_file_name);
    format!("{EMBEDDINGS_DIR}/{stem}{EMBEDDINGS_SUFFIX}")
}

/// Glob matching every embeddings file.
pub fn embeddings_pattern() -> String {
    format!("{EMBEDDINGS_DIR}/*{EMBEDDINGS_SUFFIX}")
}

/// Where the artifact for `[start, end)` is written.
pub fn aggregate_path(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "{AGGREGATES_DIR}/{}_{}.json",
        start.format("%Y%m%dT%H%M%SZ"),
        end.format("%Y%m%dT%H%M%SZ")
    )
}
