//! SQLite-backed class + daily-entry store.
//!
//! Tables:
//! - `classes`: name, location, owner — `UNIQUE(user_id, name)` rejects a
//!   second class with the same name for the same owner.
//! - `daily_entries`: date, topic, two optional audio attachments (URL +
//!   storage public id each), `ON DELETE CASCADE` under its class.

use anyhow::Result;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;

use crate::auth::store::epoch_secs;

/// Field length ceilings, matching the original schema limits.
const MAX_NAME_LEN: usize = 100;
const MAX_LOCATION_LEN: usize = 200;
const MAX_TOPIC_LEN: usize = 300;

/// A class owned by one user.
#[derive(Debug, Clone, Serialize)]
pub struct Class {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// An uploaded audio attachment: durable URL + storage identifier used for
/// later remote deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryAudio {
    pub url: String,
    pub public_id: String,
}

/// A dated entry under a class.
#[derive(Debug, Clone, Serialize)]
pub struct DailyEntry {
    pub id: String,
    #[serde(rename = "classId")]
    pub class_id: String,
    pub date: NaiveDate,
    pub topic: String,
    #[serde(rename = "audioUrl1")]
    pub audio_url_1: String,
    #[serde(rename = "audioPublicId1")]
    pub audio_public_id_1: String,
    #[serde(rename = "audioUrl2")]
    pub audio_url_2: String,
    #[serde(rename = "audioPublicId2")]
    pub audio_public_id_2: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

/// Class/entry write failure, split so the gateway can map duplicates to
/// Conflict and bad input to Validation.
#[derive(Debug, thiserror::Error)]
pub enum ClassError {
    #[error("{0}")]
    Invalid(String),
    #[error("Class with this name already exists")]
    DuplicateName,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// SQLite-backed store for classes and their daily entries.
pub struct JournalStore {
    conn: Mutex<rusqlite::Connection>,
}

impl JournalStore {
    /// Open (or create) the journal tables in the database at the given path.
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS classes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                location TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(user_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_classes_user ON classes(user_id);

            CREATE TABLE IF NOT EXISTS daily_entries (
                id TEXT PRIMARY KEY,
                class_id TEXT NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                topic TEXT NOT NULL,
                audio_url_1 TEXT NOT NULL DEFAULT '',
                audio_public_id_1 TEXT NOT NULL DEFAULT '',
                audio_url_2 TEXT NOT NULL DEFAULT '',
                audio_public_id_2 TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_class ON daily_entries(class_id);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Classes ─────────────────────────────────────────────────────

    /// Create a class for a user. Inputs are trimmed; empty name/location is
    /// invalid; a duplicate name under the same owner is a conflict.
    pub fn create_class(
        &self,
        user_id: &str,
        name: &str,
        location: &str,
    ) -> Result<Class, ClassError> {
        let name = name.trim();
        let location = location.trim();
        if name.is_empty() || location.is_empty() {
            return Err(ClassError::Invalid(
                "Please provide class name and location".to_string(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ClassError::Invalid(
                "Class name cannot exceed 100 characters".to_string(),
            ));
        }
        if location.len() > MAX_LOCATION_LEN {
            return Err(ClassError::Invalid(
                "Location cannot exceed 200 characters".to_string(),
            ));
        }

        let class_id = uuid::Uuid::new_v4().to_string();
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO classes (id, user_id, name, location, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![class_id, user_id, name, location, now],
        );

        match result {
            Ok(_) => Ok(Class {
                id: class_id,
                name: name.to_string(),
                location: location.to_string(),
                user_id: user_id.to_string(),
                created_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(ClassError::DuplicateName)
            }
            Err(e) => Err(ClassError::Storage(e.into())),
        }
    }

    /// All classes owned by a user, newest first.
    pub fn list_classes(&self, user_id: &str) -> Result<Vec<Class>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, location, created_at
             FROM classes WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let classes = stmt
            .query_map(rusqlite::params![user_id], |row| {
                Ok(Class {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    location: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    /// Look up a class only if it is owned by the user. Ownership failures
    /// and absence are the same `None`.
    pub fn get_class(&self, user_id: &str, class_id: &str) -> Result<Option<Class>> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, user_id, name, location, created_at
             FROM classes WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![class_id, user_id],
            |row| {
                Ok(Class {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    location: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        );

        match row {
            Ok(class) => Ok(Some(class)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ── Daily entries ───────────────────────────────────────────────

    /// Entries for a class, most recent date first. Callers must have
    /// verified class ownership already.
    pub fn list_entries(&self, class_id: &str) -> Result<Vec<DailyEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, class_id, date, topic,
                    audio_url_1, audio_public_id_1, audio_url_2, audio_public_id_2,
                    created_at, updated_at
             FROM daily_entries WHERE class_id = ?1
             ORDER BY date DESC, rowid DESC",
        )?;
        let entries = stmt
            .query_map(rusqlite::params![class_id], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Create an entry under a class. Audio fields are write-once here —
    /// there is no re-upload path on update.
    pub fn create_entry(
        &self,
        class_id: &str,
        date: NaiveDate,
        topic: &str,
        audio_1: EntryAudio,
        audio_2: EntryAudio,
    ) -> Result<DailyEntry, ClassError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ClassError::Invalid(
                "Please provide date and topic".to_string(),
            ));
        }
        if topic.len() > MAX_TOPIC_LEN {
            return Err(ClassError::Invalid(
                "Topic cannot exceed 300 characters".to_string(),
            ));
        }

        let entry_id = uuid::Uuid::new_v4().to_string();
        let now = epoch_secs();
        let date_str = date.to_string();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO daily_entries
                (id, class_id, date, topic,
                 audio_url_1, audio_public_id_1, audio_url_2, audio_public_id_2,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                entry_id,
                class_id,
                date_str,
                topic,
                audio_1.url,
                audio_1.public_id,
                audio_2.url,
                audio_2.public_id,
                now,
                now,
            ],
        )
        .map_err(|e| ClassError::Storage(e.into()))?;

        Ok(DailyEntry {
            id: entry_id,
            class_id: class_id.to_string(),
            date,
            topic: topic.to_string(),
            audio_url_1: audio_1.url,
            audio_public_id_1: audio_1.public_id,
            audio_url_2: audio_2.url,
            audio_public_id_2: audio_2.public_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Look up an entry scoped to its class.
    pub fn get_entry(&self, class_id: &str, entry_id: &str) -> Result<Option<DailyEntry>> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, class_id, date, topic,
                    audio_url_1, audio_public_id_1, audio_url_2, audio_public_id_2,
                    created_at, updated_at
             FROM daily_entries WHERE id = ?1 AND class_id = ?2",
            rusqlite::params![entry_id, class_id],
            entry_from_row,
        );

        match row {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the topic if one is given; always bumps `updated_at`. Audio
    /// fields are not touched by this path. Returns the updated entry, or
    /// `None` if the entry does not exist under that class.
    pub fn update_entry_topic(
        &self,
        class_id: &str,
        entry_id: &str,
        topic: Option<&str>,
    ) -> Result<Option<DailyEntry>, ClassError> {
        if let Some(topic) = topic {
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(ClassError::Invalid("Topic cannot be empty".to_string()));
            }
            if topic.len() > MAX_TOPIC_LEN {
                return Err(ClassError::Invalid(
                    "Topic cannot exceed 300 characters".to_string(),
                ));
            }
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE daily_entries SET topic = ?1, updated_at = ?2
                 WHERE id = ?3 AND class_id = ?4",
                rusqlite::params![topic, epoch_secs(), entry_id, class_id],
            )
            .map_err(|e| ClassError::Storage(e.into()))?;
        } else {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE daily_entries SET updated_at = ?1 WHERE id = ?2 AND class_id = ?3",
                rusqlite::params![epoch_secs(), entry_id, class_id],
            )
            .map_err(|e| ClassError::Storage(e.into()))?;
        }

        self.get_entry(class_id, entry_id).map_err(ClassError::from)
    }

    /// Delete an entry scoped to its class. Returns the deleted entry so the
    /// caller can clean up its remote audio objects.
    pub fn delete_entry(&self, class_id: &str, entry_id: &str) -> Result<Option<DailyEntry>> {
        let entry = match self.get_entry(class_id, entry_id)? {
            Some(e) => e,
            None => return Ok(None),
        };

        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM daily_entries WHERE id = ?1 AND class_id = ?2",
            rusqlite::params![entry_id, class_id],
        )?;
        Ok(if deleted > 0 { Some(entry) } else { None })
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyEntry> {
    let date_str: String = row.get(2)?;
    let date = date_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(DailyEntry {
        id: row.get(0)?,
        class_id: row.get(1)?,
        date,
        topic: row.get(3)?,
        audio_url_1: row.get(4)?,
        audio_public_id_1: row.get(5)?,
        audio_url_2: row.get(6)?,
        audio_public_id_2: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
