//! Synheart Activity Pipeline - local activity capture and embedding.
//!
//! Captures typed sentences, click rates and foreground-window changes,
//! queues them durably on disk, embeds them on a schedule and rolls the
//! embeddings up into daily aggregates.
//!
//! # Privacy Guarantees
//!
//! - **Obfuscated at rest**: typed text is stored ROT13-obfuscated
//! - **No individual clicks**: only clicks-per-minute samples are stored
//! - **No coordinates**: cursor position is never read
//! - **Transparency**: collection counts are logged and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐   ┌─────────────┐
//! │ EventSource│──▶│  Segmenters  │──▶│ LogStore │──▶│  Processor  │
//! │ (OS hooks) │   │ kbd/mouse/win│   │ active/  │   │ (embedding) │
//! └────────────┘   └──────────────┘   │ pending/ │   └─────────────┘
//!                                     │ ...      │          │
//!                                     └──────────┘          ▼
//!                                          ▲         ┌─────────────┐
//!                                          └─────────│ Aggregator  │
//!                                                    └─────────────┘
//! ```
//!
//! Each stage runs as its own process; see [`launch`].
//!
//! # Example
//!
//! ```no_run
//! use synheart_activity_pipeline::{embedding::HashingEmbedder, store::LogStore};
//! use synheart_activity_pipeline::{core::LogCategory, pipeline::Processor};
//!
//! let store = LogStore::open("/tmp/activity/logs").unwrap();
//! let embedder = HashingEmbedder::new(256);
//! let report = Processor::new(&store, &embedder, 32)
//!     .run(&LogCategory::ALL)
//!     .unwrap();
//! println!("embedded {} records", report.records_embedded);
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod embedding;
pub mod launch;
pub mod pipeline;
pub mod store;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorConfig, CollectorError, EventSource, RawEvent, TimedEvent};
pub use config::{Config, ConfigError, SourceConfig};
pub use core::{AggregateArtifact, CapturedRecord, EmbeddingRecord, InputLog, LogCategory, WindowLog};
pub use embedding::{EmbeddingError, EmbeddingService};
pub use launch::{run_role, Role, RoleError, RoleOptions, RoleReport};
pub use store::{LogStore, StoreError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║         SYNHEART ACTIVITY PIPELINE - PRIVACY DECLARATION         ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent records your computer activity for local analysis.   ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • Sentences you type (obfuscated before they touch disk)      ║
║    • How many times per minute you click                         ║
║    • Which window is in front (title and program name)           ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • Individual clicks or where your cursor is                   ║
║    • Screen content or screenshots                               ║
║    • Keys pressed inside other users' sessions                   ║
║                                                                  ║
║  Records are embedded on a schedule and summarized per day.      ║
║  Nothing leaves this machine unless a remote embedding           ║
║  endpoint is configured.                                         ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    synheart-activity status                                      ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
