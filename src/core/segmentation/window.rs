//! Foreground-window transitions.

use super::MonotonicStamp;
use crate::collector::ForegroundChange;
use crate::core::records::{WindowLog, UNKNOWN_PROCESS};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Turns foreground notifications into [`WindowLog`]s, one per notification.
///
/// Missing metadata is not an error: an unreadable title is stored empty and
/// an unresolved process as [`UNKNOWN_PROCESS`].
#[derive(Debug)]
pub struct FocusTracker {
    clock: MonotonicStamp,
    last_handle: Option<u64>,
    active: bool,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self {
            clock: MonotonicStamp::default(),
            last_handle: None,
            active: true,
        }
    }

    pub fn on_foreground(&mut self, change: ForegroundChange) -> Option<WindowLog> {
        self.on_foreground_at(change, Utc::now())
    }

    pub fn on_foreground_at(
        &mut self,
        change: ForegroundChange,
        at: DateTime<Utc>,
    ) -> Option<WindowLog> {
        if !self.active {
            return None;
        }

        let process_name = change
            .process_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                tracing::debug!(handle = change.handle, "owning process not resolved");
                UNKNOWN_PROCESS.to_string()
            });

        self.last_handle = Some(change.handle);
        Some(WindowLog {
            id: Uuid::new_v4(),
            timestamp: self.clock.stamp(at),
            window_handle: change.handle,
            window_title: change.title.unwrap_or_default(),
            process_name,
        })
    }

    /// Handle of the most recent foreground window.
    pub fn current_handle(&self) -> Option<u64> {
        self.last_handle
    }

    /// Stop accepting notifications. Nothing is buffered, so nothing flushes.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for FocusTracker {
    fn default() -> Self {
        Self::new()
    }
}
