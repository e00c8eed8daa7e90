//! Event collection module.
//!
//! Platform hook mechanics live behind the [`EventSource`] trait. The capture
//! loop only ever sees [`TimedEvent`]s arriving on a channel.

pub mod channel;
pub mod types;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod noop;

use crossbeam_channel::Receiver;
use thiserror::Error;

// Re-export commonly used types
pub use channel::ChannelSource;
pub use types::{ForegroundChange, RawEvent, TimedEvent};

#[cfg(target_os = "windows")]
pub use windows::WindowsSource;

/// Platform-agnostic collector type alias
#[cfg(target_os = "windows")]
pub type Collector = WindowsSource;

#[cfg(not(target_os = "windows"))]
pub use noop::NoopSource;

/// Platform-agnostic collector type alias
#[cfg(not(target_os = "windows"))]
pub type Collector = NoopSource;

/// Capacity of the hook-to-capture-loop channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 10_000;

/// Configuration for which event sources to capture.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub capture_keyboard: bool,
    pub capture_mouse: bool,
    pub capture_window: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_mouse: true,
            capture_window: true,
        }
    }
}

/// Errors that can occur during event collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector is already running")]
    AlreadyRunning,
    #[error("failed to register {hook} hook")]
    HookRegistration { hook: &'static str },
}

/// A stream of raw input and window-change notifications.
///
/// Implementations deliver events serially from their own thread. `stop` must
/// be safe to call when `start` never succeeded.
pub trait EventSource {
    /// Register the OS hooks and begin forwarding events.
    fn start(&mut self) -> Result<(), CollectorError>;

    /// Release the hooks. Events already queued stay in the receiver.
    fn stop(&mut self);

    /// Check if the source is currently delivering events.
    fn is_running(&self) -> bool;

    /// Get the receiver for raw events.
    fn receiver(&self) -> &Receiver<TimedEvent>;

    /// Try to receive an event without blocking.
    fn try_recv(&self) -> Option<TimedEvent> {
        self.receiver().try_recv().ok()
    }
}
