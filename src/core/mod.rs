//! Core functionality.
//!
//! This module contains:
//! - Record types shared by every role
//! - The at-rest obfuscation transform
//! - Segmentation engines that turn raw events into records

pub mod obfuscation;
pub mod records;
pub mod segmentation;

// Re-export commonly used types
pub use records::{
    AggregateArtifact, CapturedRecord, CategorySummary, EmbeddingRecord, InputLog, LogCategory,
    WindowLog, UNKNOWN_PROCESS,
};
pub use segmentation::{ClickRateSegmenter, FocusTracker, SentenceSegmenter};
