//! Burnki crate - WaniKani burned items as flashcards
//!
//! This crate provides the sync core of Burnki:
//! - Domain models (Subject, Assignment, CardRecord, Watermark)
//! - WaniKani API v2 client over a pluggable HTTP transport
//! - Card and note type rendering
//! - Storage trait abstractions for the deck, audio and watermark
//! - Idempotent, resumable sync engine
//! - Host command registration
//!
//! The crate has no UI dependencies; the host application drives it
//! through the commands in [`host`].

pub mod cards;
pub mod config;
pub mod error;
pub mod host;
pub mod models;
pub mod storage;
pub mod sync;
pub mod wanikani;

pub use cards::{DECK_NAME, NOTE_TYPE_NAME, NoteType, build_card};
pub use config::Settings;
pub use error::SyncError;
pub use host::{Command, CommandHandler, CommandRegistry, StartupAction, register_commands, startup_action};
pub use models::{Assignment, AudioRef, CardRecord, Subject, SubjectId, SubjectType, Watermark};
pub use storage::{
    AudioCache, CardStore, ConfigWatermarkStore, FileAudioCache, InMemoryCardStore,
    InMemoryWatermarkStore, SqliteCardStore, UpsertOutcome, WatermarkStore,
};
pub use sync::{CancelToken, SyncMode, SyncOrchestrator, SyncPhase, SyncProgress, SyncReport};
pub use wanikani::{HttpResponse, HttpTransport, MockTransport, RetryPolicy, UreqTransport, WaniKaniClient};
