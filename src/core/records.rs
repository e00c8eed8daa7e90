//! Persisted record types.
//!
//! Every record is written as one JSON line. Keyboard content is stored
//! obfuscated; [`InputLog::plain_text`] undoes that for consumers.

use crate::core::obfuscation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Capture category of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Keyboard,
    Mouse,
    Window,
}

impl LogCategory {
    pub const ALL: [LogCategory; 3] = [LogCategory::Keyboard, LogCategory::Mouse, LogCategory::Window];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Keyboard => "keyboard",
            LogCategory::Mouse => "mouse",
            LogCategory::Window => "window",
        }
    }

    /// Whether content of this category is obfuscated at rest.
    pub fn is_obfuscated(&self) -> bool {
        matches!(self, LogCategory::Keyboard)
    }

    /// Convert stored content to the form handed to the embedding service.
    pub fn decode(&self, stored: &str) -> String {
        if self.is_obfuscated() {
            obfuscation::reveal(stored)
        } else {
            stored.to_string()
        }
    }

    /// Convert plain text to its at-rest form.
    pub fn encode(&self, plain: &str) -> String {
        if self.is_obfuscated() {
            obfuscation::transform(plain)
        } else {
            plain.to_string()
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyboard" => Ok(LogCategory::Keyboard),
            "mouse" => Ok(LogCategory::Mouse),
            "window" => Ok(LogCategory::Window),
            other => Err(format!("unknown log category '{other}'")),
        }
    }
}

/// A flushed keyboard sentence or mouse click-rate sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// At-rest content (obfuscated for keyboard)
    pub content: String,
    pub category: LogCategory,
}

impl InputLog {
    /// Build a log from plain text, encoding it for storage.
    pub fn from_plain(category: LogCategory, plain: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            content: category.encode(plain),
            category,
        }
    }

    pub fn plain_text(&self) -> String {
        self.category.decode(&self.content)
    }
}

/// Placeholder recorded when the owning process cannot be resolved.
pub const UNKNOWN_PROCESS: &str = "unknown";

/// A foreground-window transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub window_handle: u64,
    pub window_title: String,
    pub process_name: String,
}

impl WindowLog {
    /// Text submitted for embedding.
    pub fn embedding_text(&self) -> String {
        if self.window_title.is_empty() {
            self.process_name.clone()
        } else {
            format!("{} - {}", self.window_title, self.process_name)
        }
    }
}

/// One line of a captured segment, as read back by the processing stage.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedRecord {
    Input(InputLog),
    Window(WindowLog),
}

impl CapturedRecord {
    /// Parse one segment line according to the segment's category.
    pub fn parse(category: LogCategory, line: &str) -> Result<Self, serde_json::Error> {
        match category {
            LogCategory::Window => serde_json::from_str(line).map(CapturedRecord::Window),
            _ => serde_json::from_str(line).map(CapturedRecord::Input),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            CapturedRecord::Input(log) => log.id,
            CapturedRecord::Window(log) => log.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CapturedRecord::Input(log) => log.timestamp,
            CapturedRecord::Window(log) => log.timestamp,
        }
    }

    pub fn category(&self) -> LogCategory {
        match self {
            CapturedRecord::Input(log) => log.category,
            CapturedRecord::Window(_) => LogCategory::Window,
        }
    }

    /// Decoded text for the embedding service.
    pub fn plain_text(&self) -> String {
        match self {
            CapturedRecord::Input(log) => log.plain_text(),
            CapturedRecord::Window(log) => log.embedding_text(),
        }
    }
}

/// An embedding computed from exactly one captured record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    /// Back-reference to the captured record; not enforced
    pub source_log_id: Uuid,
    pub vector: Vec<f32>,
    pub model: String,
    pub category: LogCategory,
    /// Timestamp of the source record
    pub timestamp: DateTime<Utc>,
    /// Source text in its at-rest form
    pub source_text: String,
}

impl EmbeddingRecord {
    pub fn from_source(source: &CapturedRecord, vector: Vec<f32>, model: &str) -> Self {
        let category = source.category();
        Self {
            id: Uuid::new_v4(),
            source_log_id: source.id(),
            vector,
            model: model.to_string(),
            category,
            timestamp: source.timestamp(),
            source_text: category.encode(&source.plain_text()),
        }
    }

    /// The source text as it was before obfuscation.
    pub fn plain_source_text(&self) -> String {
        self.category.decode(&self.source_text)
    }
}

/// Summary statistics for one category within an aggregation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub count: u64,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub models: Vec<String>,
    pub mean_vector_norm: f64,
    pub vector_norm_std_dev: f64,
    /// Element-wise mean, absent when vector lengths disagree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Vec<f32>>,
    /// Mouse only: mean clicks per minute across samples
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_click_rate: Option<f64>,
    /// Mouse only: highest clicks per minute seen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_click_rate: Option<f64>,
}

/// Rolled-up view of every embedding in `[period_start, period_end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateArtifact {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub device: String,
    pub total_records: u64,
    pub counts: BTreeMap<LogCategory, u64>,
    pub categories: BTreeMap<LogCategory, CategorySummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip_names() {
        for category in LogCategory::ALL {
            assert_eq!(category.as_str().parse::<LogCategory>(), Ok(category));
        }
        assert!("clipboard".parse::<LogCategory>().is_err());
    }

    #[test]
    fn test_keyboard_content_obfuscated() {
        let log = InputLog::from_plain(LogCategory::Keyboard, "hi.", Utc::now());
        assert_eq!(log.content, "uv.");
        assert_eq!(log.plain_text(), "hi.");
    }

    #[test]
    fn test_mouse_content_plain() {
        let log = InputLog::from_plain(LogCategory::Mouse, "3.50", Utc::now());
        assert_eq!(log.content, "3.50");
    }

    #[test]
    fn test_category_serializes_lowercase() {
        let json = serde_json::to_string(&LogCategory::Window).unwrap();
        assert_eq!(json, "\"window\"");
    }

    #[test]
    fn test_parse_window_line() {
        let log = WindowLog {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            window_handle: 7,
            window_title: "Report.docx".to_string(),
            process_name: "WINWORD.EXE".to_string(),
        };
        let line = serde_json::to_string(&log).unwrap();
        let parsed = CapturedRecord::parse(LogCategory::Window, &line).unwrap();
        assert_eq!(parsed.category(), LogCategory::Window);
        assert_eq!(parsed.plain_text(), "Report.docx - WINWORD.EXE");
    }

    #[test]
    fn test_embedding_record_keeps_source_at_rest_form() {
        let log = InputLog::from_plain(LogCategory::Keyboard, "secret plan", Utc::now());
        let source = CapturedRecord::Input(log.clone());
        let record = EmbeddingRecord::from_source(&source, vec![0.5, 0.5], "hashing-64");
        assert_eq!(record.source_log_id, log.id);
        assert_ne!(record.id, log.id);
        assert_eq!(record.source_text, log.content);
        assert_eq!(record.plain_source_text(), "secret plan");
        assert_eq!(record.timestamp, log.timestamp);
    }
}
