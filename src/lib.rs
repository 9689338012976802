// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod checkpoint;
pub mod config;
pub mod harvest;
pub mod metrics;
pub mod sink;
pub mod source;
pub mod timefmt;
pub mod window;

mod atomic;

// ---- Re-exports for stable public API ----
pub use crate::checkpoint::{Checkpoint, CheckpointStore};
pub use crate::harvest::error::HarvestError;
pub use crate::harvest::types::{Batch, FetchOutcome, Payload, SinkUploader, SourceFetcher};
pub use crate::harvest::{Harvester, RunMode, RunSummary, StopReason};
pub use crate::window::Window;
