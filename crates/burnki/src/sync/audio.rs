//! Pronunciation audio resolution
//!
//! Picks one recording per vocabulary subject, serving it from the local
//! cache when possible and downloading it otherwise.

use log::{debug, warn};

use crate::error::SyncError;
use crate::models::{AudioRef, PronunciationAudio, Subject};
use crate::storage::{AudioCache, AudioKey};
use crate::wanikani::{HttpTransport, WaniKaniClient};

/// Choose the recording to attach to a subject
///
/// Only MPEG recordings are considered. Among them the first one wins after
/// ordering by: pronounces the primary reading, male voice, lowest voice
/// actor id, URL.
pub fn select_audio(subject: &Subject) -> Option<&PronunciationAudio> {
    let primary = subject.primary_reading();
    subject
        .audios
        .iter()
        .filter(|a| a.is_mpeg())
        .min_by(|a, b| audio_rank(a, primary).cmp(&audio_rank(b, primary)))
}

/// Sort key for recordings; lower is better
fn audio_rank<'s>(audio: &'s PronunciationAudio, primary: Option<&str>) -> (bool, bool, u64, &'s str) {
    (
        primary.is_none() || audio.pronunciation.as_deref() != primary,
        !audio.is_male(),
        audio.voice_actor_id.unwrap_or(u64::MAX),
        audio.url.as_str(),
    )
}

/// Outcome of resolving audio for one subject
#[derive(Debug)]
pub enum AudioResolution {
    /// No audio wanted or available for this subject
    None,
    /// Served from the local cache
    Cached(AudioRef),
    /// Downloaded and stored in the cache
    Downloaded(AudioRef),
    /// Download or caching failed; the card is built without audio
    Failed(SyncError),
}

impl AudioResolution {
    pub fn audio_ref(&self) -> Option<&AudioRef> {
        match self {
            AudioResolution::Cached(audio) | AudioResolution::Downloaded(audio) => Some(audio),
            _ => None,
        }
    }
}

/// Resolves pronunciation audio through the cache
pub struct AudioResolver<'a, T: HttpTransport> {
    client: &'a WaniKaniClient<T>,
    cache: &'a dyn AudioCache,
    enabled: bool,
}

impl<'a, T: HttpTransport> AudioResolver<'a, T> {
    pub fn new(client: &'a WaniKaniClient<T>, cache: &'a dyn AudioCache, enabled: bool) -> Self {
        Self {
            client,
            cache,
            enabled,
        }
    }

    /// Resolve audio for a subject
    ///
    /// Never fails the sync: problems come back as [`AudioResolution::Failed`].
    pub fn resolve(&self, subject: &Subject) -> AudioResolution {
        if !self.enabled || !subject.subject_type.is_vocabulary() {
            return AudioResolution::None;
        }
        let Some(audio) = select_audio(subject) else {
            return AudioResolution::None;
        };

        let key = AudioKey::new(subject.id, subject.primary_reading().unwrap_or_default());
        let failed = |message: String| {
            AudioResolution::Failed(SyncError::MediaDownload {
                subject_id: subject.id,
                message,
            })
        };

        match self.cache.lookup(&key) {
            Ok(Some(cached)) => {
                debug!("Audio for subject {} already cached", subject.id);
                return AudioResolution::Cached(cached);
            }
            Ok(None) => {}
            Err(e) => warn!("Audio cache lookup failed for subject {}: {:#}", subject.id, e),
        }

        let data = match self.client.download_audio(&audio.url) {
            Ok(data) if data.is_empty() => return failed("empty audio file".to_string()),
            Ok(data) => data,
            Err(e) => return failed(e.to_string()),
        };

        match self.cache.store(&key, &data) {
            Ok(stored) => AudioResolution::Downloaded(stored),
            Err(e) => failed(format!("{:#}", e)),
        }
    }
}
