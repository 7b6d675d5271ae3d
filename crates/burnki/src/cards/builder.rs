//! Card rendering from burned subjects
//!
//! A pure transformation: the same assignment, subject and audio always
//! produce the same card.

use crate::models::{Assignment, AudioRef, CardRecord, Subject, SubjectType};

/// SRS stage label on every Burnki card
const BURNED_LABEL: &str = "Burned";

/// Build the card for a burned subject
///
/// `audio` is the locally cached pronunciation, if one was resolved.
pub fn build_card(assignment: &Assignment, subject: &Subject, audio: Option<&AudioRef>) -> CardRecord {
    let mut card = CardRecord {
        subject_id: subject.id,
        badge: subject.subject_type,
        characters: subject.display_characters(),
        subject_type: subject.subject_type.display_name().to_string(),
        meanings: format_meanings(subject),
        readings: format_readings(subject),
        user_meanings: subject.meaning_synonyms.join(", "),
        meaning_note: subject.meaning_note.clone().unwrap_or_default(),
        reading_note: subject.reading_note.clone().unwrap_or_default(),
        audio: audio.cloned(),
        context_sentences: format_sentences(subject),
        level: subject.level,
        srs_stage: BURNED_LABEL.to_string(),
        burned_at: assignment.burned_at,
        front: String::new(),
        back: String::new(),
    };

    card.front = render_front(&card);
    card.back = render_back(&card);
    card
}

fn format_meanings(subject: &Subject) -> String {
    subject.accepted_meanings().collect::<Vec<_>>().join(", ")
}

fn format_readings(subject: &Subject) -> String {
    match subject.subject_type {
        SubjectType::Radical => String::new(),
        SubjectType::Kanji => {
            let of_kind = |kind: &str| {
                subject
                    .readings
                    .iter()
                    .filter(|r| r.kind.as_deref() == Some(kind))
                    .map(|r| r.reading.as_str())
                    .collect::<Vec<_>>()
            };

            let mut parts = Vec::new();
            let onyomi = of_kind("onyomi");
            if !onyomi.is_empty() {
                parts.push(format!("On: {}", onyomi.join(", ")));
            }
            let kunyomi = of_kind("kunyomi");
            if !kunyomi.is_empty() {
                parts.push(format!("Kun: {}", kunyomi.join(", ")));
            }
            parts.join(" · ")
        }
        SubjectType::Vocabulary | SubjectType::KanaVocabulary => subject
            .readings
            .iter()
            .map(|r| r.reading.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn format_sentences(subject: &Subject) -> String {
    subject
        .context_sentences
        .iter()
        .map(|s| format!("{}<br>{}", s.ja, s.en))
        .collect::<Vec<_>>()
        .join("<br><br>")
}

fn render_front(card: &CardRecord) -> String {
    format!(
        "<div class=\"card-front\">\n  <div class=\"characters\">{}</div>\n  <div class=\"type-badge {}\">{}</div>\n</div>",
        card.characters,
        card.badge.as_str(),
        card.subject_type
    )
}

fn render_back(card: &CardRecord) -> String {
    let mut sections = vec![
        card.front.clone(),
        "<hr id=\"answer\">".to_string(),
    ];

    // Empty sections are left out entirely
    let mut push = |class: &str, body: String| {
        if !body.is_empty() {
            sections.push(format!("<div class=\"{}\">{}</div>", class, body));
        }
    };

    push("meanings", card.meanings.clone());
    if !card.user_meanings.is_empty() {
        push("user-meanings", format!("User: {}", card.user_meanings));
    }
    push("readings", card.readings.clone());
    push("audio", card.audio_field());
    push("sentences", card.context_sentences.clone());
    if !card.meaning_note.is_empty() {
        push(
            "note",
            format!("<span class=\"note-label\">Meaning note:</span> {}", card.meaning_note),
        );
    }
    if !card.reading_note.is_empty() {
        push(
            "note",
            format!("<span class=\"note-label\">Reading note:</span> {}", card.reading_note),
        );
    }

    sections.push(format!(
        "<div class=\"meta\">Level {} · {}</div>",
        card.level, card.srs_stage
    ));

    format!("<div class=\"card-back\">\n{}\n</div>", sections.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextSentence, Meaning, Reading, StudyMaterial, SubjectId};
    use chrono::{TimeZone, Utc};

    fn meaning(value: &str, accepted: bool) -> Meaning {
        Meaning {
            meaning: value.to_string(),
            primary: false,
            accepted_answer: accepted,
        }
    }

    fn reading(value: &str, kind: Option<&str>) -> Reading {
        Reading {
            reading: value.to_string(),
            kind: kind.map(str::to_string),
            primary: false,
            accepted_answer: true,
        }
    }

    fn burned(subject_id: u64) -> Assignment {
        Assignment::burned(1, SubjectId(subject_id), Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
    }

    fn kanji() -> Subject {
        let mut subject = Subject::new(SubjectId(440), SubjectType::Kanji, "一");
        subject.characters = Some("一".to_string());
        subject.level = 1;
        subject.meanings = vec![meaning("One", true), meaning("Uno", false)];
        subject.readings = vec![
            reading("いち", Some("onyomi")),
            reading("いつ", Some("onyomi")),
            reading("ひと", Some("kunyomi")),
            reading("かず", Some("nanori")),
        ];
        subject
    }

    fn vocabulary() -> Subject {
        let mut subject = Subject::new(SubjectId(2467), SubjectType::Vocabulary, "一つ");
        subject.characters = Some("一つ".to_string());
        subject.level = 1;
        subject.meanings = vec![meaning("One Thing", true), meaning("One", true)];
        subject.readings = vec![reading("ひとつ", None)];
        subject.context_sentences = vec![
            ContextSentence {
                ja: "りんごを一つください。".to_string(),
                en: "One apple, please.".to_string(),
            },
            ContextSentence {
                ja: "一つだけ。".to_string(),
                en: "Just one.".to_string(),
            },
        ];
        subject
    }

    #[test]
    fn test_kanji_card() {
        let card = build_card(&burned(440), &kanji(), None);

        assert_eq!(card.subject_id, SubjectId(440));
        assert_eq!(card.characters, "一");
        assert_eq!(card.subject_type, "Kanji");
        assert_eq!(card.meanings, "One");
        assert_eq!(card.readings, "On: いち, いつ · Kun: ひと");
        assert_eq!(card.srs_stage, "Burned");
        assert_eq!(card.level, 1);
        assert!(card.audio.is_none());
        assert_eq!(card.audio_field(), "");
    }

    #[test]
    fn test_kanji_readings_omit_empty_group() {
        let mut subject = kanji();
        subject.readings.retain(|r| r.kind.as_deref() != Some("onyomi"));
        let card = build_card(&burned(440), &subject, None);
        assert_eq!(card.readings, "Kun: ひと");
    }

    #[test]
    fn test_vocabulary_card_with_audio_and_notes() {
        let subject = vocabulary().with_study_material(StudyMaterial {
            subject_id: SubjectId(2467),
            meaning_synonyms: vec!["single item".to_string(), "a thing".to_string()],
            meaning_note: Some("Think <b>one</b> object".to_string()),
            reading_note: None,
        });
        let audio = AudioRef {
            filename: "burnki_2467_ひとつ.mp3".to_string(),
            path: "/media/burnki_2467_ひとつ.mp3".into(),
        };

        let card = build_card(&burned(2467), &subject, Some(&audio));

        assert_eq!(card.meanings, "One Thing, One");
        assert_eq!(card.readings, "ひとつ");
        assert_eq!(card.user_meanings, "single item, a thing");
        assert_eq!(card.meaning_note, "Think <b>one</b> object");
        assert_eq!(card.reading_note, "");
        assert_eq!(card.audio_field(), "[sound:burnki_2467_ひとつ.mp3]");
        assert_eq!(
            card.context_sentences,
            "りんごを一つください。<br>One apple, please.<br><br>一つだけ。<br>Just one."
        );

        assert!(card.back.starts_with("<div class=\"card-back\">\n<div class=\"card-front\">"));
        assert!(card.back.contains("<hr id=\"answer\">"));
        assert!(card.back.contains("<div class=\"user-meanings\">User: single item, a thing</div>"));
        assert!(card.back.contains("<div class=\"audio\">[sound:burnki_2467_ひとつ.mp3]</div>"));
        assert!(card.back.contains("Meaning note:</span> Think <b>one</b> object"));
        assert!(!card.back.contains("Reading note"));
        assert!(card.back.contains("<div class=\"meta\">Level 1 · Burned</div>"));
    }

    #[test]
    fn test_radical_without_characters() {
        let mut subject = Subject::new(SubjectId(8761), SubjectType::Radical, "gun-1");
        subject.meanings = vec![meaning("Gun", true)];
        subject.level = 3;

        let card = build_card(&burned(8761), &subject, None);

        assert_eq!(card.characters, "Gun 1");
        assert_eq!(card.readings, "");
        assert_eq!(
            card.front,
            "<div class=\"card-front\">\n  <div class=\"characters\">Gun 1</div>\n  <div class=\"type-badge radical\">Radical</div>\n</div>"
        );
        // Empty sections are omitted from the back
        assert!(!card.back.contains("class=\"readings\""));
        assert!(!card.back.contains("class=\"sentences\""));
        assert!(!card.back.contains("class=\"audio\""));
    }

    #[test]
    fn test_kana_vocabulary_badge() {
        let mut subject = Subject::new(SubjectId(9000), SubjectType::KanaVocabulary, "ありがとう");
        subject.characters = Some("ありがとう".to_string());
        let card = build_card(&burned(9000), &subject, None);
        assert_eq!(card.subject_type, "Kana vocabulary");
        assert!(card.front.contains("type-badge kana_vocabulary"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let assignment = burned(2467);
        let subject = vocabulary();
        assert_eq!(
            build_card(&assignment, &subject, None),
            build_card(&assignment, &subject, None)
        );
    }
}
