//! Click-rate sampling over fixed intervals.

use super::MonotonicStamp;
use crate::core::records::{InputLog, LogCategory};
use chrono::{DateTime, Duration, Utc};

/// Default sampling interval in seconds.
pub const DEFAULT_CLICK_INTERVAL_SECS: u64 = 60;

/// Counts clicks and emits one clicks-per-minute sample per interval.
///
/// Individual clicks are never recorded. Both [`tick_at`](Self::tick_at) and
/// [`stop_at`](Self::stop_at) take `&mut self` and `stop` deactivates the
/// engine, so an interval cannot be emitted twice.
#[derive(Debug)]
pub struct ClickRateSegmenter {
    interval: Duration,
    clicks: u64,
    interval_start: DateTime<Utc>,
    clock: MonotonicStamp,
    active: bool,
}

impl ClickRateSegmenter {
    pub fn new(interval: std::time::Duration) -> Self {
        Self::starting_at(interval, Utc::now())
    }

    pub fn starting_at(interval: std::time::Duration, start: DateTime<Utc>) -> Self {
        let interval = Duration::from_std(interval)
            .ok()
            .filter(|interval| *interval > Duration::zero())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_CLICK_INTERVAL_SECS as i64));
        Self {
            interval,
            clicks: 0,
            interval_start: start,
            clock: MonotonicStamp::default(),
            active: true,
        }
    }

    /// Count one click.
    pub fn on_click(&mut self) {
        if self.active {
            self.clicks += 1;
        }
    }

    pub fn tick(&mut self) -> Option<InputLog> {
        self.tick_at(Utc::now())
    }

    /// Emit a sample if the current interval has elapsed at `now`.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Option<InputLog> {
        if !self.active || now < self.interval_start + self.interval {
            return None;
        }
        let sample = self.sample(now);
        // Intervals stay on a fixed grid; missed ones are skipped, not merged.
        while self.interval_start + self.interval <= now {
            self.interval_start += self.interval;
        }
        Some(sample)
    }

    pub fn stop(&mut self) -> Option<InputLog> {
        self.stop_at(Utc::now())
    }

    /// Emit the in-progress interval and deactivate.
    pub fn stop_at(&mut self, now: DateTime<Utc>) -> Option<InputLog> {
        if !self.active {
            return None;
        }
        self.active = false;
        Some(self.sample(now))
    }

    /// Clicks counted in the current interval.
    pub fn pending_clicks(&self) -> u64 {
        self.clicks
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn sample(&mut self, now: DateTime<Utc>) -> InputLog {
        let rate = format_rate(self.clicks, self.interval);
        self.clicks = 0;
        InputLog::from_plain(LogCategory::Mouse, &rate, self.clock.stamp(now))
    }
}

/// Clicks per minute with two decimals.
fn format_rate(clicks: u64, interval: Duration) -> String {
    let minutes = interval.num_milliseconds() as f64 / 60_000.0;
    let rate = if minutes > 0.0 {
        clicks as f64 / minutes
    } else {
        0.0
    };
    format!("{rate:.2}")
}

/// Parse a sample written by this engine back into clicks per minute.
pub fn parse_rate(content: &str) -> Option<f64> {
    content.trim().parse::<f64>().ok().filter(|r| r.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_rate_per_interval() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::from_secs(60), t0);
        for _ in 0..7 {
            segmenter.on_click();
        }
        assert!(segmenter.tick_at(t0 + Duration::seconds(30)).is_none());

        let sample = segmenter.tick_at(t0 + Duration::seconds(60)).unwrap();
        assert_eq!(sample.content, "7.00");
        assert_eq!(sample.category, LogCategory::Mouse);
        assert_eq!(segmenter.pending_clicks(), 0);
    }

    #[test]
    fn test_rate_scales_with_interval() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::from_secs(120), t0);
        for _ in 0..5 {
            segmenter.on_click();
        }
        let sample = segmenter.tick_at(t0 + Duration::seconds(120)).unwrap();
        assert_eq!(sample.content, "2.50");
    }

    #[test]
    fn test_empty_interval_still_emits() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::from_secs(60), t0);
        let sample = segmenter.tick_at(t0 + Duration::seconds(61)).unwrap();
        assert_eq!(sample.content, "0.00");
    }

    #[test]
    fn test_stop_emits_once_and_blocks_ticks() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::from_secs(60), t0);
        segmenter.on_click();
        segmenter.on_click();

        let sample = segmenter.stop_at(t0 + Duration::seconds(10)).unwrap();
        assert_eq!(sample.content, "2.00");
        assert!(segmenter.tick_at(t0 + Duration::seconds(120)).is_none());
        assert!(segmenter.stop_at(t0 + Duration::seconds(130)).is_none());

        segmenter.on_click();
        assert_eq!(segmenter.pending_clicks(), 0);
    }

    #[test]
    fn test_tick_after_stop_not_double_counted() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::from_secs(60), t0);
        segmenter.on_click();
        let tick = segmenter.tick_at(t0 + Duration::seconds(60)).unwrap();
        assert_eq!(tick.content, "1.00");
        let stop = segmenter.stop_at(t0 + Duration::seconds(61)).unwrap();
        assert_eq!(stop.content, "0.00");
    }

    #[test]
    fn test_late_ticks_do_not_stretch_intervals() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::from_secs(60), t0);
        // Polled a second late; the next interval still ends at t0 + 120s
        assert!(segmenter.tick_at(t0 + Duration::seconds(61)).is_some());
        segmenter.on_click();
        assert!(segmenter.tick_at(t0 + Duration::seconds(119)).is_none());
        let sample = segmenter.tick_at(t0 + Duration::seconds(120)).unwrap();
        assert_eq!(sample.content, "1.00");
    }

    #[test]
    fn test_missed_intervals_are_skipped() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::from_secs(60), t0);
        assert!(segmenter.tick_at(t0 + Duration::seconds(150)).is_some());
        // Back on the grid: the interval in progress ends at t0 + 180s
        assert!(segmenter.tick_at(t0 + Duration::seconds(179)).is_none());
        assert!(segmenter.tick_at(t0 + Duration::seconds(180)).is_some());
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let t0 = Utc::now();
        let mut segmenter = ClickRateSegmenter::starting_at(StdDuration::ZERO, t0);
        assert!(segmenter.tick_at(t0 + Duration::seconds(59)).is_none());
        assert!(segmenter.tick_at(t0 + Duration::seconds(60)).is_some());
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("3.50"), Some(3.5));
        assert_eq!(parse_rate("abc"), None);
    }
}
