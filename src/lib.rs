// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod api;
pub mod config;
pub mod cursor;
pub mod enrich;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod relay;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::RelayConfig;
pub use crate::cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use crate::ingest::types::{FeedProvider, ItemId, NormalizedItem};
pub use crate::relay::{Relay, RelaySettings, SourceOutcome, SourceReport, Stage};
