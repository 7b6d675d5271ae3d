//! Card record produced for the flashcard deck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{SubjectId, SubjectType};

/// Reference to a locally stored pronunciation file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    /// Media file name, as referenced from the card (`[sound:<filename>]`)
    pub filename: String,
    /// Absolute location of the file in the media directory
    pub path: PathBuf,
}

/// A renderable flashcard derived from a burned subject
///
/// The subject id is the card's identity: stores upsert by it, so
/// re-applying the same record never creates a second card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub subject_id: SubjectId,
    /// Subject type, used as the badge CSS class
    pub badge: SubjectType,
    pub characters: String,
    /// Badge label ("Kanji", "Kana vocabulary", ...)
    pub subject_type: String,
    pub meanings: String,
    pub readings: String,
    pub user_meanings: String,
    pub meaning_note: String,
    pub reading_note: String,
    pub audio: Option<AudioRef>,
    pub context_sentences: String,
    pub level: u32,
    pub srs_stage: String,
    pub burned_at: Option<DateTime<Utc>>,
    /// Rendered front side (HTML)
    pub front: String,
    /// Rendered back side (HTML)
    pub back: String,
}

impl CardRecord {
    /// Value of the `Audio` note field
    pub fn audio_field(&self) -> String {
        self.audio
            .as_ref()
            .map(|a| format!("[sound:{}]", a.filename))
            .unwrap_or_default()
    }

    /// Note field values, in note type field order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("SubjectId", self.subject_id.to_string()),
            ("Characters", self.characters.clone()),
            ("SubjectType", self.subject_type.clone()),
            ("Meanings", self.meanings.clone()),
            ("Readings", self.readings.clone()),
            ("UserMeanings", self.user_meanings.clone()),
            ("MeaningNote", self.meaning_note.clone()),
            ("ReadingNote", self.reading_note.clone()),
            ("Audio", self.audio_field()),
            ("ContextSentences", self.context_sentences.clone()),
            ("Level", self.level.to_string()),
            ("SrsStage", self.srs_stage.clone()),
        ]
    }
}
