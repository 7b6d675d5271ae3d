//! Subject model representing a WaniKani learnable unit

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a subject (WaniKani subject ID)
///
/// This is the stable identity of a card: one card exists per subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub u64);

impl SubjectId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SubjectId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of subject, as reported in the resource `object` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Radical,
    Kanji,
    Vocabulary,
    KanaVocabulary,
}

impl SubjectType {
    /// Parse the API object name ("radical", "kanji", ...)
    pub fn from_api(object: &str) -> Option<Self> {
        match object {
            "radical" => Some(Self::Radical),
            "kanji" => Some(Self::Kanji),
            "vocabulary" => Some(Self::Vocabulary),
            "kana_vocabulary" => Some(Self::KanaVocabulary),
            _ => None,
        }
    }

    /// API object name, also used as the CSS badge class
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Radical => "radical",
            Self::Kanji => "kanji",
            Self::Vocabulary => "vocabulary",
            Self::KanaVocabulary => "kana_vocabulary",
        }
    }

    /// Human-readable label shown on the card badge
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Radical => "Radical",
            Self::Kanji => "Kanji",
            Self::Vocabulary => "Vocabulary",
            Self::KanaVocabulary => "Kana vocabulary",
        }
    }

    /// Whether subjects of this type carry pronunciation audio
    pub fn is_vocabulary(&self) -> bool {
        matches!(self, Self::Vocabulary | Self::KanaVocabulary)
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A meaning of a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meaning {
    pub meaning: String,
    pub primary: bool,
    pub accepted_answer: bool,
}

/// A reading of a kanji or vocabulary subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub reading: String,
    /// "onyomi", "kunyomi" or "nanori" for kanji; absent for vocabulary
    pub kind: Option<String>,
    pub primary: bool,
    pub accepted_answer: bool,
}

/// A pronunciation audio asset attached to a vocabulary subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationAudio {
    pub url: String,
    pub content_type: String,
    /// Voice actor gender ("male" / "female")
    pub gender: Option<String>,
    pub voice_actor_id: Option<u64>,
    /// The reading this recording pronounces
    pub pronunciation: Option<String>,
}

impl PronunciationAudio {
    pub fn is_mpeg(&self) -> bool {
        self.content_type.contains("mpeg")
    }

    pub fn is_male(&self) -> bool {
        self.gender.as_deref() == Some("male")
    }
}

/// A Japanese example sentence with its English translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSentence {
    pub ja: String,
    pub en: String,
}

/// The user's own study material for a subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyMaterial {
    pub subject_id: SubjectId,
    pub meaning_synonyms: Vec<String>,
    pub meaning_note: Option<String>,
    pub reading_note: Option<String>,
}

/// Snapshot of a WaniKani subject, merged with the user's study material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub subject_type: SubjectType,
    /// Unicode characters; some radicals only exist as images and have none
    pub characters: Option<String>,
    pub slug: String,
    pub level: u32,
    pub meanings: Vec<Meaning>,
    pub readings: Vec<Reading>,
    pub audios: Vec<PronunciationAudio>,
    pub context_sentences: Vec<ContextSentence>,
    /// User synonyms (from study materials)
    pub meaning_synonyms: Vec<String>,
    /// Personal meaning note (from study materials)
    pub meaning_note: Option<String>,
    /// Personal reading note (from study materials)
    pub reading_note: Option<String>,
}

impl Subject {
    /// Create a subject with no meanings, readings or audio
    pub fn new(id: SubjectId, subject_type: SubjectType, slug: impl Into<String>) -> Self {
        Self {
            id,
            subject_type,
            characters: None,
            slug: slug.into(),
            level: 0,
            meanings: Vec::new(),
            readings: Vec::new(),
            audios: Vec::new(),
            context_sentences: Vec::new(),
            meaning_synonyms: Vec::new(),
            meaning_note: None,
            reading_note: None,
        }
    }

    /// Merge the user's study material into this subject
    pub fn with_study_material(mut self, material: StudyMaterial) -> Self {
        self.meaning_synonyms = material.meaning_synonyms;
        self.meaning_note = material.meaning_note;
        self.reading_note = material.reading_note;
        self
    }

    /// Meanings accepted as answers, in API order
    pub fn accepted_meanings(&self) -> impl Iterator<Item = &str> {
        self.meanings
            .iter()
            .filter(|m| m.accepted_answer)
            .map(|m| m.meaning.as_str())
    }

    /// The primary reading, falling back to the first reading
    pub fn primary_reading(&self) -> Option<&str> {
        self.readings
            .iter()
            .find(|r| r.primary)
            .or_else(|| self.readings.first())
            .map(|r| r.reading.as_str())
    }

    /// Characters to show on the card front
    ///
    /// Radicals without Unicode characters fall back to their slug,
    /// title-cased with hyphens turned into spaces ("gun-1" -> "Gun 1").
    pub fn display_characters(&self) -> String {
        match self.characters.as_deref() {
            Some(chars) if !chars.is_empty() => chars.to_string(),
            _ => title_case(&self.slug.replace('-', " ")),
        }
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
