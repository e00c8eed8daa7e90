//! The three pipeline stages.
//!
//! - [`capture`]: turns raw events into records in `active/` segments
//! - [`processing`]: claims sealed segments and writes their embeddings
//! - [`aggregation`]: rolls embeddings in a time window into one artifact
//!
//! Stages share nothing but the [`LogStore`](crate::store::LogStore) and run
//! as separate processes.

pub mod aggregation;
pub mod capture;
pub mod processing;

pub use aggregation::{
    device_name, summarize, AggregateError, AggregateOutcome, AggregationWindow, Aggregator,
};
pub use capture::{CaptureError, CaptureOptions, CaptureReport, CaptureSession};
pub use processing::{
    ClaimOutcome, FileFailure, ProcessError, ProcessReport, Processor, SegmentOutcome,
};
