//! In-process event source fed through a channel.
//!
//! Used for replaying recorded streams and for driving the capture loop in
//! tests without OS hooks.

use crate::collector::types::{RawEvent, TimedEvent};
use crate::collector::{CollectorError, EventSource, EVENT_CHANNEL_CAPACITY};
use crossbeam_channel::{bounded, Receiver, Sender};

/// An event source whose events are pushed by the caller.
pub struct ChannelSource {
    sender: Sender<TimedEvent>,
    receiver: Receiver<TimedEvent>,
    running: bool,
    fail_start: bool,
}

impl ChannelSource {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            receiver,
            running: false,
            fail_start: false,
        }
    }

    /// A source whose `start` reports a hook registration failure.
    pub fn failing() -> Self {
        let mut source = Self::new();
        source.fail_start = true;
        source
    }

    /// Get a sender that injects events into this source.
    pub fn sender(&self) -> Sender<TimedEvent> {
        self.sender.clone()
    }

    /// Push an event stamped with the current time.
    pub fn push(&self, event: RawEvent) {
        let _ = self.sender.try_send(TimedEvent::now(event));
    }

    /// Push every character of `text` as a text event.
    pub fn push_text(&self, text: &str) {
        for c in text.chars() {
            self.push(RawEvent::Text(c));
        }
    }
}

impl Default for ChannelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for ChannelSource {
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.fail_start {
            return Err(CollectorError::HookRegistration { hook: "channel" });
        }
        if self.running {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn receiver(&self) -> &Receiver<TimedEvent> {
        &self.receiver
    }
}
