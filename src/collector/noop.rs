//! Non-Windows (noop) event source.
//!
//! This exists so the crate (and binary) can compile on targets without a
//! hook implementation. It starts successfully and never emits events.

use crate::collector::types::TimedEvent;
use crate::collector::{CollectorConfig, CollectorError, EventSource, EVENT_CHANNEL_CAPACITY};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A noop source that never emits events.
pub struct NoopSource {
    _config: CollectorConfig,
    _sender: Sender<TimedEvent>,
    receiver: Receiver<TimedEvent>,
    running: Arc<AtomicBool>,
}

impl NoopSource {
    /// Create a new noop source.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            _config: config,
            _sender: sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EventSource for NoopSource {
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        tracing::warn!("no event hooks on this platform; capture will record nothing");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> &Receiver<TimedEvent> {
        &self.receiver
    }
}
