//! Transparency module.
//!
//! Tracks and exposes how much the agent collects, supporting user trust
//! without recording any captured content.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, read_persisted, PersistedStats,
    SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
