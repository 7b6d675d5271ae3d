//! In-memory storage implementation
//!
//! Used by tests and dry runs.

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{CardStore, UpsertOutcome, WatermarkStore};
use crate::cards::NoteType;
use crate::models::{CardRecord, SubjectId, Watermark};

/// In-memory implementation of CardStore
///
/// Cards are kept in a BTreeMap so listing is ordered by subject id.
pub struct InMemoryCardStore {
    note_type: RwLock<Option<NoteType>>,
    cards: RwLock<BTreeMap<SubjectId, CardRecord>>,
}

impl InMemoryCardStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            note_type: RwLock::new(None),
            cards: RwLock::new(BTreeMap::new()),
        }
    }

    /// The stored note type, if it has been created
    pub fn note_type(&self) -> Result<Option<NoteType>> {
        let note_type = self.note_type.read().map_err(|_| poisoned())?;
        Ok(note_type.clone())
    }
}

impl Default for InMemoryCardStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

impl CardStore for InMemoryCardStore {
    fn ensure_note_type(&self) -> Result<bool> {
        let current = NoteType::burnki();
        let mut stored = self.note_type.write().map_err(|_| poisoned())?;
        match stored.as_mut() {
            Some(existing) => Ok(existing.update_from(&current)),
            None => {
                *stored = Some(current);
                Ok(true)
            }
        }
    }

    fn upsert_card(&self, card: &CardRecord) -> Result<UpsertOutcome> {
        let mut cards = self.cards.write().map_err(|_| poisoned())?;
        match cards.insert(card.subject_id, card.clone()) {
            Some(_) => Ok(UpsertOutcome::Updated),
            None => Ok(UpsertOutcome::Created),
        }
    }

    fn get_card(&self, subject_id: SubjectId) -> Result<Option<CardRecord>> {
        let cards = self.cards.read().map_err(|_| poisoned())?;
        Ok(cards.get(&subject_id).cloned())
    }

    fn list_cards(&self) -> Result<Vec<CardRecord>> {
        let cards = self.cards.read().map_err(|_| poisoned())?;
        Ok(cards.values().cloned().collect())
    }

    fn count_cards(&self) -> Result<usize> {
        let cards = self.cards.read().map_err(|_| poisoned())?;
        Ok(cards.len())
    }

    fn clear(&self) -> Result<()> {
        self.cards.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

/// In-memory watermark storage
#[derive(Default)]
pub struct InMemoryWatermarkStore {
    watermark: RwLock<Watermark>,
}

impl InMemoryWatermarkStore {
    pub fn new(watermark: Watermark) -> Self {
        Self {
            watermark: RwLock::new(watermark),
        }
    }
}

impl WatermarkStore for InMemoryWatermarkStore {
    fn load_watermark(&self) -> Result<Watermark> {
        Ok(*self.watermark.read().map_err(|_| poisoned())?)
    }

    fn save_watermark(&self, watermark: Watermark) -> Result<()> {
        *self.watermark.write().map_err(|_| poisoned())? = watermark;
        Ok(())
    }
}
