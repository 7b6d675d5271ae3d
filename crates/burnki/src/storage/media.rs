//! Audio cache trait for downloaded pronunciation files

use anyhow::Result;

use crate::models::{AudioRef, SubjectId};

/// Key for storing/retrieving a pronunciation file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioKey {
    /// Subject the audio belongs to
    pub subject_id: SubjectId,
    /// Reading the audio pronounces
    pub reading: String,
}

impl AudioKey {
    pub fn new(subject_id: SubjectId, reading: impl Into<String>) -> Self {
        Self {
            subject_id,
            reading: reading.into(),
        }
    }

    /// Media file name for this key
    ///
    /// `burnki_<subject_id>_<reading>.mp3`, with every non-alphanumeric
    /// character of the reading replaced by `_`.
    pub fn filename(&self) -> String {
        let safe: String = self
            .reading
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let safe = if safe.is_empty() { "audio".to_string() } else { safe };
        format!("burnki_{}_{}.mp3", self.subject_id, safe)
    }
}

/// Trait for the local audio cache
///
/// The cache is shared between syncs; only the sync holding the sync lock
/// writes to it.
pub trait AudioCache: Send + Sync {
    /// Return the cached file for the key, if present
    fn lookup(&self, key: &AudioKey) -> Result<Option<AudioRef>>;

    /// Store audio data, replacing any existing file
    fn store(&self, key: &AudioKey, data: &[u8]) -> Result<AudioRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_keeps_kana() {
        let key = AudioKey::new(SubjectId(2467), "ひとつ");
        assert_eq!(key.filename(), "burnki_2467_ひとつ.mp3");
    }

    #[test]
    fn test_filename_replaces_unsafe_characters() {
        let key = AudioKey::new(SubjectId(7), "a/b c.");
        assert_eq!(key.filename(), "burnki_7_a_b_c_.mp3");
    }

    #[test]
    fn test_filename_empty_reading() {
        assert_eq!(AudioKey::new(SubjectId(7), "").filename(), "burnki_7_audio.mp3");
    }
}
