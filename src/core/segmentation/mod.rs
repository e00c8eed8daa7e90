//! Segmentation engines.
//!
//! One engine per capture category folds raw events into discrete records.
//! Each engine owns its buffer and counters privately and is driven from a
//! single thread through `&mut self`.

pub mod keyboard;
pub mod mouse;
pub mod window;

use chrono::{DateTime, Utc};

pub use keyboard::{SentenceSegmenter, SENTENCE_TERMINATORS};
pub use mouse::{parse_rate, ClickRateSegmenter, DEFAULT_CLICK_INTERVAL_SECS};
pub use window::FocusTracker;

/// Hands out timestamps that never go backwards within one engine.
///
/// Wall clocks can step back (NTP, manual changes); records from one source
/// must still be ordered.
#[derive(Debug, Default, Clone)]
pub(crate) struct MonotonicStamp {
    last: Option<DateTime<Utc>>,
}

impl MonotonicStamp {
    pub(crate) fn stamp(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last {
            Some(last) if last > at => last,
            _ => at,
        };
        self.last = Some(ts);
        ts
    }
}
