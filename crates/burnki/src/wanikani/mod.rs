//! WaniKani API integration
//!
//! This module provides:
//! - A transport seam over HTTP GET (ureq in production)
//! - Retry policy with bounded exponential backoff
//! - WaniKani API v2 client for assignments, subjects and study materials
//! - Response normalization to domain models

mod client;
mod normalize;
mod retry;
mod transport;

pub use client::{AssignmentPage, AssignmentPages, DEFAULT_BASE_URL, UserProfile, WaniKaniClient};
pub use normalize::{normalize_assignment, normalize_study_material, normalize_subject};
pub use retry::RetryPolicy;
pub use transport::{
    HttpResponse, HttpTransport, MockTransport, RecordedRequest, TransportError, UreqTransport,
};

/// WaniKani API v2 response types
pub mod api {
    use serde::Deserialize;

    /// A paginated collection of resources
    #[derive(Debug, Deserialize)]
    pub struct Collection<T> {
        pub pages: Option<Pages>,
        pub total_count: Option<u64>,
        #[serde(default = "Vec::new")]
        pub data: Vec<Resource<T>>,
    }

    /// Pagination links; `next_url` is absolute and null on the last page
    #[derive(Debug, Deserialize)]
    pub struct Pages {
        pub next_url: Option<String>,
        pub per_page: Option<u32>,
    }

    /// A single resource envelope
    #[derive(Debug, Deserialize)]
    pub struct Resource<T> {
        pub id: u64,
        pub object: String,
        pub data_updated_at: Option<String>,
        pub data: T,
    }

    /// Envelope for single-object endpoints like `/user`
    #[derive(Debug, Deserialize)]
    pub struct Single<T> {
        pub data: T,
    }

    #[derive(Debug, Deserialize)]
    pub struct UserData {
        pub username: String,
        #[serde(default)]
        pub level: u32,
    }

    #[derive(Debug, Deserialize)]
    pub struct AssignmentData {
        pub subject_id: u64,
        pub subject_type: Option<String>,
        #[serde(default)]
        pub srs_stage: u8,
        pub burned_at: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SubjectData {
        pub characters: Option<String>,
        #[serde(default)]
        pub slug: String,
        #[serde(default)]
        pub level: u32,
        #[serde(default)]
        pub meanings: Vec<MeaningData>,
        /// Absent for radicals and kana-only vocabulary
        pub readings: Option<Vec<ReadingData>>,
        pub pronunciation_audios: Option<Vec<AudioData>>,
        pub context_sentences: Option<Vec<SentenceData>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct MeaningData {
        pub meaning: String,
        #[serde(default)]
        pub primary: bool,
        #[serde(default = "default_true")]
        pub accepted_answer: bool,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReadingData {
        pub reading: Option<String>,
        #[serde(rename = "type")]
        pub kind: Option<String>,
        #[serde(default)]
        pub primary: bool,
        #[serde(default = "default_true")]
        pub accepted_answer: bool,
    }

    #[derive(Debug, Deserialize)]
    pub struct AudioData {
        pub url: String,
        #[serde(default = "default_audio_content_type")]
        pub content_type: String,
        #[serde(default)]
        pub metadata: AudioMetadata,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct AudioMetadata {
        pub gender: Option<String>,
        pub voice_actor_id: Option<u64>,
        pub pronunciation: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SentenceData {
        #[serde(default)]
        pub en: String,
        #[serde(default)]
        pub ja: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct StudyMaterialData {
        pub subject_id: u64,
        pub meaning_synonyms: Option<Vec<String>>,
        pub meaning_note: Option<String>,
        pub reading_note: Option<String>,
    }

    fn default_true() -> bool {
        true
    }

    fn default_audio_content_type() -> String {
        "audio/mpeg".to_string()
    }
}
