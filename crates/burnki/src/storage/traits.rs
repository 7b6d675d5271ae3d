//! Storage trait definitions

use crate::models::{CardRecord, SubjectId, Watermark};
use anyhow::Result;

/// Result of upserting a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No card existed for the subject
    Created,
    /// An existing card was overwritten
    Updated,
}

/// Trait for flashcard deck storage
///
/// Cards are keyed by subject id. Every upsert is durable on return and
/// independent of the others, so a batch may be applied partially and
/// re-applied safely.
pub trait CardStore: Send + Sync {
    /// Create or update the Burnki note type
    ///
    /// Returns true if anything changed.
    fn ensure_note_type(&self) -> Result<bool>;

    /// Insert or update the card for `card.subject_id`
    fn upsert_card(&self, card: &CardRecord) -> Result<UpsertOutcome>;

    /// Get the card for a subject
    fn get_card(&self, subject_id: SubjectId) -> Result<Option<CardRecord>>;

    /// Check if a card exists for a subject
    fn has_card(&self, subject_id: SubjectId) -> Result<bool> {
        Ok(self.get_card(subject_id)?.is_some())
    }

    /// List all cards, ordered by subject id
    fn list_cards(&self) -> Result<Vec<CardRecord>>;

    /// Count cards in the deck
    fn count_cards(&self) -> Result<usize>;

    /// Clear all cards (for testing)
    fn clear(&self) -> Result<()>;
}

/// Persistence for the sync watermark
pub trait WatermarkStore: Send + Sync {
    fn load_watermark(&self) -> Result<Watermark>;

    /// Durably replace the stored watermark
    fn save_watermark(&self, watermark: Watermark) -> Result<()>;
}
