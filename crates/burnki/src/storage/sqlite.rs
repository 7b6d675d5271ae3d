//! SQLite-based card storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{CardStore, UpsertOutcome};
use crate::cards::{DECK_NAME, NoteType};
use crate::models::{AudioRef, CardRecord, SubjectId, SubjectType};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Note type definitions (one row per note type name)
            CREATE TABLE note_types (
                name TEXT PRIMARY KEY,
                fields TEXT NOT NULL,  -- JSON array of field names
                template_name TEXT NOT NULL,
                front_template TEXT NOT NULL,
                back_template TEXT NOT NULL,
                css TEXT NOT NULL,
                deck TEXT NOT NULL
            );

            -- One card per WaniKani subject
            CREATE TABLE cards (
                subject_id INTEGER PRIMARY KEY,
                badge TEXT NOT NULL,
                characters TEXT NOT NULL,
                subject_type TEXT NOT NULL,
                meanings TEXT NOT NULL,
                readings TEXT NOT NULL,
                user_meanings TEXT NOT NULL,
                meaning_note TEXT NOT NULL,
                reading_note TEXT NOT NULL,
                audio_filename TEXT,
                audio_path TEXT,
                context_sentences TEXT NOT NULL,
                level INTEGER NOT NULL,
                srs_stage TEXT NOT NULL,
                burned_at TEXT,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_cards_burned_at ON cards(burned_at ASC);
            "#,
        ),
    ])
}

/// SQLite-based card storage
///
/// Each upsert runs in its own transaction, so a crash mid-batch leaves
/// every card either fully written or untouched.
pub struct SqliteCardStore {
    conn: Mutex<Connection>,
}

impl SqliteCardStore {
    /// Open (or create) a card database at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL keeps readers (the status command) unblocked during a sync;
        // NORMAL sync is safe under WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("card database lock poisoned"))
    }

    /// Load a stored note type by name
    pub fn note_type(&self, name: &str) -> Result<Option<NoteType>> {
        let conn = self.lock()?;
        load_note_type(&conn, name)
    }
}

fn load_note_type(conn: &Connection, name: &str) -> Result<Option<NoteType>> {
    let row: Option<(String, String, String, String, String, String)> = conn
        .query_row(
            "SELECT name, fields, template_name, front_template, back_template, css
             FROM note_types WHERE name = ?",
            [name],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()?;

    let Some((name, fields_json, template_name, front_template, back_template, css)) = row else {
        return Ok(None);
    };

    let fields: Vec<String> = serde_json::from_str(&fields_json)
        .with_context(|| format!("Corrupt field list for note type {}", name))?;

    Ok(Some(NoteType {
        name,
        fields,
        template_name,
        front_template,
        back_template,
        css,
    }))
}

fn save_note_type(conn: &Connection, note_type: &NoteType) -> Result<()> {
    conn.execute(
        "INSERT INTO note_types
         (name, fields, template_name, front_template, back_template, css, deck)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
            fields = excluded.fields,
            template_name = excluded.template_name,
            front_template = excluded.front_template,
            back_template = excluded.back_template,
            css = excluded.css,
            deck = excluded.deck",
        params![
            note_type.name,
            serde_json::to_string(&note_type.fields)?,
            note_type.template_name,
            note_type.front_template,
            note_type.back_template,
            note_type.css,
            DECK_NAME,
        ],
    )?;
    Ok(())
}

const CARD_COLUMNS: &str = "subject_id, badge, characters, subject_type, meanings, readings,
     user_meanings, meaning_note, reading_note, audio_filename, audio_path,
     context_sentences, level, srs_stage, burned_at, front, back";

/// Card columns as read from the database, before validation
struct CardRow {
    subject_id: i64,
    badge: String,
    characters: String,
    subject_type: String,
    meanings: String,
    readings: String,
    user_meanings: String,
    meaning_note: String,
    reading_note: String,
    audio_filename: Option<String>,
    audio_path: Option<String>,
    context_sentences: String,
    level: i64,
    srs_stage: String,
    burned_at: Option<String>,
    front: String,
    back: String,
}

impl CardRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            subject_id: row.get(0)?,
            badge: row.get(1)?,
            characters: row.get(2)?,
            subject_type: row.get(3)?,
            meanings: row.get(4)?,
            readings: row.get(5)?,
            user_meanings: row.get(6)?,
            meaning_note: row.get(7)?,
            reading_note: row.get(8)?,
            audio_filename: row.get(9)?,
            audio_path: row.get(10)?,
            context_sentences: row.get(11)?,
            level: row.get(12)?,
            srs_stage: row.get(13)?,
            burned_at: row.get(14)?,
            front: row.get(15)?,
            back: row.get(16)?,
        })
    }

    fn into_card(self) -> Result<CardRecord> {
        let badge = SubjectType::from_api(&self.badge)
            .with_context(|| format!("Unknown badge '{}' on card {}", self.badge, self.subject_id))?;

        let burned_at = self
            .burned_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .with_context(|| format!("Invalid burned_at '{}'", s))
            })
            .transpose()?;

        let audio = match (self.audio_filename, self.audio_path) {
            (Some(filename), Some(path)) => Some(AudioRef {
                filename,
                path: path.into(),
            }),
            _ => None,
        };

        Ok(CardRecord {
            subject_id: SubjectId(self.subject_id as u64),
            badge,
            characters: self.characters,
            subject_type: self.subject_type,
            meanings: self.meanings,
            readings: self.readings,
            user_meanings: self.user_meanings,
            meaning_note: self.meaning_note,
            reading_note: self.reading_note,
            audio,
            context_sentences: self.context_sentences,
            level: self.level as u32,
            srs_stage: self.srs_stage,
            burned_at,
            front: self.front,
            back: self.back,
        })
    }
}

impl CardStore for SqliteCardStore {
    fn ensure_note_type(&self) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = NoteType::burnki();
        let changed = match load_note_type(&tx, &current.name)? {
            Some(mut stored) => {
                let changed = stored.update_from(&current);
                if changed {
                    save_note_type(&tx, &stored)?;
                }
                changed
            }
            None => {
                save_note_type(&tx, &current)?;
                true
            }
        };

        tx.commit()?;
        Ok(changed)
    }

    fn upsert_card(&self, card: &CardRecord) -> Result<UpsertOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let subject_id = card.subject_id.get() as i64;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM cards WHERE subject_id = ?)",
            [subject_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO cards
             (subject_id, badge, characters, subject_type, meanings, readings,
              user_meanings, meaning_note, reading_note, audio_filename, audio_path,
              context_sentences, level, srs_stage, burned_at, front, back)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(subject_id) DO UPDATE SET
                badge = excluded.badge,
                characters = excluded.characters,
                subject_type = excluded.subject_type,
                meanings = excluded.meanings,
                readings = excluded.readings,
                user_meanings = excluded.user_meanings,
                meaning_note = excluded.meaning_note,
                reading_note = excluded.reading_note,
                audio_filename = excluded.audio_filename,
                audio_path = excluded.audio_path,
                context_sentences = excluded.context_sentences,
                level = excluded.level,
                srs_stage = excluded.srs_stage,
                burned_at = excluded.burned_at,
                front = excluded.front,
                back = excluded.back,
                updated_at = datetime('now')",
            params![
                subject_id,
                card.badge.as_str(),
                card.characters,
                card.subject_type,
                card.meanings,
                card.readings,
                card.user_meanings,
                card.meaning_note,
                card.reading_note,
                card.audio.as_ref().map(|a| a.filename.as_str()),
                card.audio.as_ref().map(|a| a.path.to_string_lossy().into_owned()),
                card.context_sentences,
                card.level as i64,
                card.srs_stage,
                card.burned_at.map(|t| t.to_rfc3339()),
                card.front,
                card.back,
            ],
        )?;

        tx.commit()?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    fn get_card(&self, subject_id: SubjectId) -> Result<Option<CardRecord>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM cards WHERE subject_id = ?", CARD_COLUMNS),
                [subject_id.get() as i64],
                CardRow::from_row,
            )
            .optional()?;

        row.map(CardRow::into_card).transpose()
    }

    fn has_card(&self, subject_id: SubjectId) -> Result<bool> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE subject_id = ?",
            [subject_id.get() as i64],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn list_cards(&self) -> Result<Vec<CardRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cards ORDER BY subject_id ASC",
            CARD_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], CardRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(CardRow::into_card).collect()
    }

    fn count_cards(&self) -> Result<usize> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;

        Ok(count as usize)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "DELETE FROM cards;
             DELETE FROM note_types;",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteCardStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("burnki.test.sqlite");
        let store = SqliteCardStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn make_test_card(id: u64, meanings: &str) -> CardRecord {
        CardRecord {
            subject_id: SubjectId(id),
            badge: SubjectType::Vocabulary,
            characters: "一つ".to_string(),
            subject_type: "Vocabulary".to_string(),
            meanings: meanings.to_string(),
            readings: "ひとつ".to_string(),
            user_meanings: String::new(),
            meaning_note: String::new(),
            reading_note: "hi-to-tsu".to_string(),
            audio: Some(AudioRef {
                filename: format!("burnki_{}_ひとつ.mp3", id),
                path: format!("/tmp/media/burnki_{}_ひとつ.mp3", id).into(),
            }),
            context_sentences: String::new(),
            level: 1,
            srs_stage: "Burned".to_string(),
            burned_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            front: "<div>一つ</div>".to_string(),
            back: "<div>One Thing</div>".to_string(),
        }
    }

    #[test]
    fn test_card_crud() {
        let (store, _dir) = create_test_store();
        let card = make_test_card(2467, "One Thing");

        assert_eq!(store.upsert_card(&card).unwrap(), UpsertOutcome::Created);
        let retrieved = store.get_card(SubjectId(2467)).unwrap().unwrap();
        assert_eq!(retrieved, card);
        assert!(store.has_card(SubjectId(2467)).unwrap());
        assert!(!store.has_card(SubjectId(1)).unwrap());
        assert!(store.get_card(SubjectId(1)).unwrap().is_none());
    }

    #[test]
    fn test_upsert_overwrites_existing_card() {
        let (store, _dir) = create_test_store();

        store.upsert_card(&make_test_card(1, "One")).unwrap();
        let mut updated = make_test_card(1, "One, Single");
        updated.audio = None;

        assert_eq!(store.upsert_card(&updated).unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.count_cards().unwrap(), 1);
        assert_eq!(store.get_card(SubjectId(1)).unwrap().unwrap(), updated);
    }

    #[test]
    fn test_list_cards_ordered() {
        let (store, _dir) = create_test_store();
        store.upsert_card(&make_test_card(30, "Thirty")).unwrap();
        store.upsert_card(&make_test_card(10, "Ten")).unwrap();
        store.upsert_card(&make_test_card(20, "Twenty")).unwrap();

        let ids: Vec<u64> = store
            .list_cards()
            .unwrap()
            .iter()
            .map(|c| c.subject_id.get())
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_ensure_note_type() {
        let (store, _dir) = create_test_store();

        assert!(store.ensure_note_type().unwrap());
        assert!(!store.ensure_note_type().unwrap());

        let stored = store.note_type("Burnki").unwrap().unwrap();
        assert_eq!(stored, NoteType::burnki());
    }

    #[test]
    fn test_reopen_keeps_cards() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("burnki.test.sqlite");

        {
            let store = SqliteCardStore::new(&db_path).unwrap();
            store.upsert_card(&make_test_card(5, "Five")).unwrap();
        }

        let store = SqliteCardStore::new(&db_path).unwrap();
        assert_eq!(store.count_cards().unwrap(), 1);
    }

    #[test]
    fn test_clear() {
        let (store, _dir) = create_test_store();
        store.ensure_note_type().unwrap();
        store.upsert_card(&make_test_card(1, "One")).unwrap();

        store.clear().unwrap();
        assert_eq!(store.count_cards().unwrap(), 0);
        assert!(store.note_type("Burnki").unwrap().is_none());
    }
}
