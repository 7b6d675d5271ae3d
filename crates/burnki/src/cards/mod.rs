//! Flashcard content
//!
//! The note type Burnki cards use, and the builder that renders a burned
//! subject into a card record.

mod builder;
mod note_type;

pub use builder::build_card;
pub use note_type::{DECK_NAME, FIELDS, NOTE_TYPE_NAME, NoteType};
