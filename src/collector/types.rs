//! Raw event types delivered by an event source.
//!
//! These are the only shapes that cross from OS hook callbacks into the
//! capture loop. Nothing here is persisted directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A foreground-window transition with best-effort metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundChange {
    /// Opaque OS window handle
    pub handle: u64,
    /// Window title, if it could be read
    pub title: Option<String>,
    /// Executable name of the owning process, if it could be resolved
    pub process_name: Option<String>,
}

impl ForegroundChange {
    pub fn new(handle: u64) -> Self {
        Self {
            handle,
            title: None,
            process_name: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_process(mut self, process_name: impl Into<String>) -> Self {
        self.process_name = Some(process_name.into());
        self
    }
}

/// Unified event type for the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawEvent {
    /// A translated character from the keyboard hook
    Text(char),
    /// A mouse button press
    Click,
    /// A window became foreground
    Foreground(ForegroundChange),
}

/// A raw event stamped with its arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub timestamp: DateTime<Utc>,
    pub event: RawEvent,
}

impl TimedEvent {
    pub fn now(event: RawEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
