//! Sentence segmentation of typed characters.

use super::MonotonicStamp;
use crate::core::records::{InputLog, LogCategory};
use chrono::{DateTime, Utc};

/// Characters that end a sentence once followed by a space.
pub const SENTENCE_TERMINATORS: [char; 3] = ['.', '?', '!'];

/// Folds a character stream into sentence records.
///
/// Rules, checked in order:
/// 1. `\r` or `\n` flushes a non-blank buffer and always clears it.
/// 2. A terminator is appended.
/// 3. A space right after a terminator flushes the buffer, and the space
///    starts the next one.
/// 4. Other control characters are dropped; everything else is appended.
#[derive(Debug)]
pub struct SentenceSegmenter {
    buffer: String,
    clock: MonotonicStamp,
    active: bool,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            clock: MonotonicStamp::default(),
            active: true,
        }
    }

    /// Feed one character, stamping any flush with the current time.
    pub fn on_char(&mut self, c: char) -> Option<InputLog> {
        self.on_char_at(c, Utc::now())
    }

    /// Feed one character received at `at`.
    pub fn on_char_at(&mut self, c: char, at: DateTime<Utc>) -> Option<InputLog> {
        if !self.active {
            return None;
        }

        match c {
            '\r' | '\n' => {
                let flushed = self.flush(at);
                self.buffer.clear();
                flushed
            }
            c if SENTENCE_TERMINATORS.contains(&c) => {
                self.buffer.push(c);
                None
            }
            ' ' if self.ends_with_terminator() => {
                let flushed = self.flush(at);
                self.buffer.clear();
                self.buffer.push(' ');
                flushed
            }
            c if c.is_control() => None,
            c => {
                self.buffer.push(c);
                None
            }
        }
    }

    /// Flush whatever is buffered and stop accepting input.
    ///
    /// Calling this again is a no-op.
    pub fn stop(&mut self) -> Option<InputLog> {
        self.stop_at(Utc::now())
    }

    pub fn stop_at(&mut self, at: DateTime<Utc>) -> Option<InputLog> {
        if !self.active {
            return None;
        }
        let flushed = self.flush(at);
        self.buffer.clear();
        self.active = false;
        flushed
    }

    /// The sentence accumulated so far.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn ends_with_terminator(&self) -> bool {
        self.buffer
            .chars()
            .last()
            .map(|c| SENTENCE_TERMINATORS.contains(&c))
            .unwrap_or(false)
    }

    fn flush(&mut self, at: DateTime<Utc>) -> Option<InputLog> {
        let sentence = self.buffer.trim();
        if sentence.is_empty() {
            return None;
        }
        let timestamp = self.clock.stamp(at);
        Some(InputLog::from_plain(LogCategory::Keyboard, sentence, timestamp))
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}
