//! The Burnki note type: fields, card template and styling

use serde::{Deserialize, Serialize};

/// Deck new Burnki cards are added to
pub const DECK_NAME: &str = "Burnki";

/// Note type name
pub const NOTE_TYPE_NAME: &str = "Burnki";

/// Note fields, in display order
pub const FIELDS: [&str; 12] = [
    "SubjectId",
    "Characters",
    "SubjectType",
    "Meanings",
    "Readings",
    "UserMeanings",
    "MeaningNote",
    "ReadingNote",
    "Audio",
    "ContextSentences",
    "Level",
    "SrsStage",
];

const TEMPLATE_NAME: &str = "Recognition";

const FRONT_TEMPLATE: &str = r#"<div class="card-front">
  <div class="characters">{{Characters}}</div>
  <div class="type-badge {{SubjectType}}">{{SubjectType}}</div>
</div>
"#;

const BACK_TEMPLATE: &str = r#"<div class="card-back">
  {{FrontSide}}
  <hr id="answer">
  <div class="meanings">{{Meanings}}</div>
  {{#UserMeanings}}<div class="user-meanings">User: {{UserMeanings}}</div>{{/UserMeanings}}
  {{#Readings}}<div class="readings">{{Readings}}</div>{{/Readings}}
  {{#Audio}}<div class="audio">{{Audio}}</div>{{/Audio}}
  {{#ContextSentences}}<div class="sentences">{{ContextSentences}}</div>{{/ContextSentences}}
  {{#MeaningNote}}<div class="note"><span class="note-label">Meaning note:</span> {{MeaningNote}}</div>{{/MeaningNote}}
  {{#ReadingNote}}<div class="note"><span class="note-label">Reading note:</span> {{ReadingNote}}</div>{{/ReadingNote}}
  <div class="meta">Level {{Level}} · {{SrsStage}}</div>
</div>
"#;

const CSS: &str = r#".card {
  font-family: "Hiragino Kaku Gothic Pro", "Noto Sans JP", "Meiryo", sans-serif;
  text-align: center;
  background: #303030;
  color: #fff;
  padding: 20px;
}

.characters {
  font-size: 4em;
  font-weight: bold;
  margin: 0.3em 0;
  line-height: 1.2;
}

.type-badge {
  display: inline-block;
  padding: 4px 16px;
  border-radius: 4px;
  font-size: 0.8em;
  text-transform: capitalize;
  color: #fff;
  background: #888;
}

/* WaniKani colors */
.type-badge.radical { background: #00aaff; }
.type-badge.kanji { background: #ff00aa; }
.type-badge.vocabulary,
.type-badge.kana_vocabulary { background: #aa00ff; }

hr#answer {
  border: none;
  border-top: 1px solid #555;
  margin: 16px 0;
}

.meanings {
  font-size: 1.6em;
  font-weight: bold;
  margin-bottom: 8px;
}

.user-meanings {
  font-size: 1.1em;
  color: #aaa;
  margin-bottom: 8px;
}

.readings {
  font-size: 1.4em;
  margin-bottom: 12px;
}

.audio {
  margin: 12px 0;
}

.sentences {
  text-align: left;
  font-size: 0.95em;
  line-height: 1.6;
  margin: 12px auto;
  max-width: 500px;
  color: #ccc;
}

.note {
  text-align: left;
  font-size: 0.9em;
  line-height: 1.5;
  margin: 8px auto;
  max-width: 500px;
  color: #bbb;
  background: #3a3a3a;
  padding: 8px 12px;
  border-radius: 4px;
}

.note-label {
  font-weight: bold;
  color: #ddd;
}

.meta {
  font-size: 0.75em;
  color: #777;
  margin-top: 16px;
}
"#;

/// A note type definition as stored in the deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteType {
    pub name: String,
    pub fields: Vec<String>,
    pub template_name: String,
    pub front_template: String,
    pub back_template: String,
    pub css: String,
}

impl NoteType {
    /// The current Burnki note type
    pub fn burnki() -> Self {
        Self {
            name: NOTE_TYPE_NAME.to_string(),
            fields: FIELDS.iter().map(|f| f.to_string()).collect(),
            template_name: TEMPLATE_NAME.to_string(),
            front_template: FRONT_TEMPLATE.to_string(),
            back_template: BACK_TEMPLATE.to_string(),
            css: CSS.to_string(),
        }
    }

    /// Bring a stored note type up to date with `current`
    ///
    /// Missing fields are appended (existing ones are kept, so older decks
    /// keep their data); templates and CSS are replaced when they differ.
    /// Returns true if anything changed.
    pub fn update_from(&mut self, current: &NoteType) -> bool {
        let mut changed = false;

        for field in &current.fields {
            if !self.fields.contains(field) {
                self.fields.push(field.clone());
                changed = true;
            }
        }

        if self.css != current.css {
            self.css = current.css.clone();
            changed = true;
        }
        if self.front_template != current.front_template {
            self.front_template = current.front_template.clone();
            changed = true;
        }
        if self.back_template != current.back_template {
            self.back_template = current.back_template.clone();
            changed = true;
        }

        changed
    }
}
