//! Sync engine for burned WaniKani items
//!
//! Provides idempotent sync operations that can be safely retried: cards
//! are upserted by subject id and the watermark only moves forward after a
//! whole batch is committed.

mod audio;
mod cancel;
mod fetch;
mod orchestrator;
mod progress;

pub use audio::{AudioResolution, AudioResolver, select_audio};
pub use cancel::CancelToken;
pub use fetch::{BurnedItem, BurnedItems, FetchStats, IncrementalFetcher, latest_per_subject};
pub use orchestrator::SyncOrchestrator;
pub use progress::{ProgressCallback, SyncMode, SyncPhase, SyncProgress, SyncReport};
