//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for the deck, the
//! downloaded audio and the sync watermark. The trait-based design allows
//! swapping between in-memory and persistent implementations.

mod media;
mod media_file;
mod memory;
mod sqlite;
mod traits;
mod watermark;

pub use media::{AudioCache, AudioKey};
pub use media_file::FileAudioCache;
pub use memory::{InMemoryCardStore, InMemoryWatermarkStore};
pub use sqlite::SqliteCardStore;
pub use traits::{CardStore, UpsertOutcome, WatermarkStore};
pub use watermark::ConfigWatermarkStore;
