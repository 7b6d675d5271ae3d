//! WaniKani API response normalization
//!
//! Converts WaniKani API resources to Burnki domain models.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

use super::api::{AssignmentData, Resource, StudyMaterialData, SubjectData};
use crate::models::{
    Assignment, ContextSentence, Meaning, PronunciationAudio, Reading, StudyMaterial, Subject,
    SubjectId, SubjectType,
};

/// Normalize an assignment resource
pub fn normalize_assignment(resource: Resource<AssignmentData>) -> Result<Assignment> {
    let data = resource.data;

    let burned_at = data
        .burned_at
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .with_context(|| format!("Invalid burned_at on assignment {}", resource.id))?;

    let updated_at = resource
        .data_updated_at
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .with_context(|| format!("Invalid data_updated_at on assignment {}", resource.id))?;

    Ok(Assignment {
        id: resource.id,
        subject_id: SubjectId(data.subject_id),
        subject_type: data.subject_type.as_deref().and_then(SubjectType::from_api),
        srs_stage: data.srs_stage,
        burned_at,
        updated_at,
    })
}

/// Normalize a subject resource
///
/// The study material fields are left empty; the fetcher merges them in.
pub fn normalize_subject(resource: Resource<SubjectData>) -> Result<Subject> {
    let Some(subject_type) = SubjectType::from_api(&resource.object) else {
        bail!(
            "Unknown subject type '{}' for subject {}",
            resource.object,
            resource.id
        );
    };
    let data = resource.data;

    let meanings = data
        .meanings
        .into_iter()
        .map(|m| Meaning {
            meaning: m.meaning,
            primary: m.primary,
            accepted_answer: m.accepted_answer,
        })
        .collect();

    let readings = data
        .readings
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| {
            let reading = r.reading.filter(|s| !s.is_empty())?;
            Some(Reading {
                reading,
                kind: r.kind,
                primary: r.primary,
                accepted_answer: r.accepted_answer,
            })
        })
        .collect();

    let audios = data
        .pronunciation_audios
        .unwrap_or_default()
        .into_iter()
        .map(|a| PronunciationAudio {
            url: a.url,
            content_type: a.content_type,
            gender: a.metadata.gender,
            voice_actor_id: a.metadata.voice_actor_id,
            pronunciation: a.metadata.pronunciation,
        })
        .collect();

    let context_sentences = data
        .context_sentences
        .unwrap_or_default()
        .into_iter()
        .map(|s| ContextSentence { ja: s.ja, en: s.en })
        .collect();

    Ok(Subject {
        id: SubjectId(resource.id),
        subject_type,
        characters: data.characters,
        slug: data.slug,
        level: data.level,
        meanings,
        readings,
        audios,
        context_sentences,
        meaning_synonyms: Vec::new(),
        meaning_note: None,
        reading_note: None,
    })
}

/// Normalize a study material resource
pub fn normalize_study_material(resource: Resource<StudyMaterialData>) -> StudyMaterial {
    let data = resource.data;
    StudyMaterial {
        subject_id: SubjectId(data.subject_id),
        meaning_synonyms: data.meaning_synonyms.unwrap_or_default(),
        meaning_note: data.meaning_note.filter(|s| !s.is_empty()),
        reading_note: data.reading_note.filter(|s| !s.is_empty()),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Failed to parse timestamp '{}'", value))?;
    Ok(parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wanikani::api::Collection;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_assignment() {
        let json = r#"{
            "id": 80463006,
            "object": "assignment",
            "data_updated_at": "2024-01-02T10:00:00.000000Z",
            "data": {
                "subject_id": 8761,
                "subject_type": "radical",
                "srs_stage": 9,
                "burned_at": "2024-01-02T10:00:00.000000Z"
            }
        }"#;
        let resource: Resource<AssignmentData> = serde_json::from_str(json).unwrap();
        let assignment = normalize_assignment(resource).unwrap();

        assert_eq!(assignment.id, 80463006);
        assert_eq!(assignment.subject_id, SubjectId(8761));
        assert_eq!(assignment.subject_type, Some(SubjectType::Radical));
        assert!(assignment.is_burned());
        assert_eq!(
            assignment.burned_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_normalize_assignment_rejects_bad_timestamp() {
        let json = r#"{
            "id": 1,
            "object": "assignment",
            "data_updated_at": null,
            "data": { "subject_id": 2, "srs_stage": 9, "burned_at": "not a date" }
        }"#;
        let resource: Resource<AssignmentData> = serde_json::from_str(json).unwrap();
        assert!(normalize_assignment(resource).is_err());
    }

    #[test]
    fn test_normalize_vocabulary_subject() {
        let json = r#"{
            "object": "collection",
            "pages": { "next_url": null, "per_page": 1000 },
            "total_count": 1,
            "data": [{
                "id": 2467,
                "object": "vocabulary",
                "data_updated_at": "2023-10-01T00:00:00.000000Z",
                "data": {
                    "characters": "一つ",
                    "slug": "一つ",
                    "level": 1,
                    "meanings": [
                        { "meaning": "One Thing", "primary": true, "accepted_answer": true },
                        { "meaning": "One", "primary": false, "accepted_answer": true },
                        { "meaning": "Single", "primary": false, "accepted_answer": false }
                    ],
                    "readings": [
                        { "reading": "ひとつ", "primary": true, "accepted_answer": true }
                    ],
                    "pronunciation_audios": [{
                        "url": "https://files.wanikani.com/a.mp3",
                        "content_type": "audio/mpeg",
                        "metadata": {
                            "gender": "male",
                            "voice_actor_id": 2,
                            "pronunciation": "ひとつ"
                        }
                    }],
                    "context_sentences": [
                        { "en": "One apple, please.", "ja": "りんごを一つください。" }
                    ]
                }
            }]
        }"#;
        let collection: Collection<SubjectData> = serde_json::from_str(json).unwrap();
        let resource = collection.data.into_iter().next().unwrap();
        let subject = normalize_subject(resource).unwrap();

        assert_eq!(subject.id, SubjectId(2467));
        assert_eq!(subject.subject_type, SubjectType::Vocabulary);
        assert_eq!(
            subject.accepted_meanings().collect::<Vec<_>>(),
            vec!["One Thing", "One"]
        );
        assert_eq!(subject.primary_reading(), Some("ひとつ"));
        assert_eq!(subject.audios.len(), 1);
        assert!(subject.audios[0].is_male());
        assert_eq!(subject.context_sentences[0].ja, "りんごを一つください。");
    }

    #[test]
    fn test_normalize_radical_without_characters() {
        let json = r#"{
            "id": 8761,
            "object": "radical",
            "data_updated_at": null,
            "data": { "characters": null, "slug": "gun", "level": 3, "meanings": [] }
        }"#;
        let resource: Resource<SubjectData> = serde_json::from_str(json).unwrap();
        let subject = normalize_subject(resource).unwrap();

        assert!(subject.characters.is_none());
        assert!(subject.readings.is_empty());
        assert!(subject.audios.is_empty());
        assert_eq!(subject.display_characters(), "Gun");
    }

    #[test]
    fn test_normalize_unknown_subject_type() {
        let json = r#"{ "id": 1, "object": "reading", "data_updated_at": null, "data": {} }"#;
        let resource: Resource<SubjectData> = serde_json::from_str(json).unwrap();
        assert!(normalize_subject(resource).is_err());
    }

    #[test]
    fn test_normalize_study_material_drops_empty_notes() {
        let json = r#"{
            "id": 65231,
            "object": "study_material",
            "data_updated_at": null,
            "data": {
                "subject_id": 241,
                "meaning_note": "",
                "reading_note": "like a bow",
                "meaning_synonyms": ["crossbow"]
            }
        }"#;
        let resource: Resource<StudyMaterialData> = serde_json::from_str(json).unwrap();
        let material = normalize_study_material(resource);

        assert_eq!(material.subject_id, SubjectId(241));
        assert!(material.meaning_note.is_none());
        assert_eq!(material.reading_note.as_deref(), Some("like a bow"));
        assert_eq!(material.meaning_synonyms, vec!["crossbow"]);
    }
}
