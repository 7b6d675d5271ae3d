//! Domain models for WaniKani subjects and Burnki cards

mod assignment;
mod card;
mod subject;
mod watermark;

pub use assignment::{Assignment, BURNED_SRS_STAGE};
pub use card::{AudioRef, CardRecord};
pub use subject::{
    ContextSentence, Meaning, PronunciationAudio, Reading, StudyMaterial, Subject, SubjectId,
    SubjectType,
};
pub use watermark::Watermark;
