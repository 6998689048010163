use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result, Row};
use serde_json::Value;
use std::path::Path;

use crate::error::StoreError;
use crate::interval;
use crate::models::{NewWord, ReviewLogEntry, Stats, Word, WordEdit};
use crate::scheduler::{SettingsStore, WordStore};

const WORD_COLUMNS: &str = "id, word, meaning, example, proficiency, review_count, correct_count, \
     wrong_count, last_review_time, next_review_time, created_at, updated_at, is_favorite";

pub struct Database {
    conn: Connection,
}

// Fixed-width UTC text so string order matches time order in SQL comparisons
fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_db_time(idx: usize, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// Keyword characters are matched literally
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn word_from_row(row: &Row) -> Result<Word> {
    let last_review_time = match row.get::<_, Option<String>>(8)? {
        Some(raw) => Some(parse_db_time(8, &raw)?),
        None => None,
    };

    Ok(Word {
        id: row.get(0)?,
        word: row.get(1)?,
        meaning: row.get(2)?,
        example: row.get(3)?,
        proficiency: row.get(4)?,
        review_count: row.get(5)?,
        correct_count: row.get(6)?,
        wrong_count: row.get(7)?,
        last_review_time,
        next_review_time: parse_db_time(9, &row.get::<_, String>(9)?)?,
        created_at: parse_db_time(10, &row.get::<_, String>(10)?)?,
        updated_at: parse_db_time(11, &row.get::<_, String>(11)?)?,
        is_favorite: row.get(12)?,
    })
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                word TEXT NOT NULL UNIQUE,
                meaning TEXT NOT NULL,
                example TEXT,
                proficiency INTEGER NOT NULL DEFAULT 0 CHECK (proficiency BETWEEN 0 AND 5),
                review_count INTEGER NOT NULL DEFAULT 0,
                correct_count INTEGER NOT NULL DEFAULT 0,
                wrong_count INTEGER NOT NULL DEFAULT 0,
                last_review_time TEXT,
                next_review_time TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS study_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                word_id INTEGER NOT NULL,
                is_correct INTEGER NOT NULL,
                reviewed_at TEXT NOT NULL,
                FOREIGN KEY (word_id) REFERENCES words(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_words_next_review ON words(next_review_time);
            CREATE INDEX IF NOT EXISTS idx_study_log_word ON study_log(word_id);
            "#,
        )?;

        Ok(())
    }

    // Word operations
    pub fn add_word(&self, new: &NewWord, now: DateTime<Utc>) -> Result<i64> {
        // New words are reviewable immediately
        self.conn.execute(
            r#"
            INSERT INTO words (word, meaning, example, next_review_time, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4, ?4)
            "#,
            params![
                new.word.trim(),
                new.meaning.trim(),
                new.example.as_deref(),
                to_db_time(now)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Bulk insert, skipping words that already exist. Returns how many were
    /// added.
    pub fn import_words(&self, words: &[NewWord], now: DateTime<Utc>) -> Result<usize> {
        let ts = to_db_time(now);
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO words
                    (word, meaning, example, next_review_time, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4, ?4)
                "#,
            )?;
            for w in words {
                inserted += stmt.execute(params![
                    w.word.trim(),
                    w.meaning.trim(),
                    w.example.as_deref(),
                    ts
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_word(&self, id: i64) -> Result<Option<Word>> {
        let word = self.conn.query_row(
            &format!("SELECT {} FROM words WHERE id = ?1", WORD_COLUMNS),
            params![id],
            word_from_row,
        );

        match word {
            Ok(w) => Ok(Some(w)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list_words(&self, favorites_only: bool) -> Result<Vec<Word>> {
        let filter = if favorites_only {
            "WHERE is_favorite = 1"
        } else {
            ""
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM words {} ORDER BY created_at DESC, id DESC",
            WORD_COLUMNS, filter
        ))?;
        let rows = stmt.query_map([], word_from_row)?;
        rows.collect()
    }

    pub fn search_words(&self, keyword: &str) -> Result<Vec<Word>> {
        let pattern = format!("%{}%", escape_like(keyword.trim()));
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM words
            WHERE word LIKE ?1 ESCAPE '\'
               OR meaning LIKE ?1 ESCAPE '\'
               OR example LIKE ?1 ESCAPE '\'
            ORDER BY created_at DESC, id DESC
            "#,
            WORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern], word_from_row)?;
        rows.collect()
    }

    pub fn update_word(&self, id: i64, edit: &WordEdit, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            UPDATE words
            SET word = COALESCE(?1, word),
                meaning = COALESCE(?2, meaning),
                example = COALESCE(?3, example),
                updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                edit.word.as_deref().map(str::trim),
                edit.meaning.as_deref().map(str::trim),
                edit.example.as_deref(),
                to_db_time(now),
                id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_word(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM words WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Flip the favorite flag. Returns the new value, or None if the word
    /// does not exist.
    pub fn toggle_favorite(&self, id: i64, now: DateTime<Utc>) -> Result<Option<bool>> {
        let changed = self.conn.execute(
            "UPDATE words SET is_favorite = NOT is_favorite, updated_at = ?1 WHERE id = ?2",
            params![to_db_time(now), id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(self.get_word(id)?.map(|w| w.is_favorite))
    }

    // Review operations
    pub fn due_words(&self, now: DateTime<Utc>) -> Result<Vec<Word>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM words
            WHERE next_review_time <= ?1
            ORDER BY next_review_time ASC, id ASC
            "#,
            WORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![to_db_time(now)], word_from_row)?;
        rows.collect()
    }

    /// Apply one answer through the interval policy and log it. Returns the
    /// updated word, or None if it does not exist.
    pub fn record_review(
        &self,
        id: i64,
        was_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Word>> {
        let Some(word) = self.get_word(id)? else {
            return Ok(None);
        };

        let next = interval::next_delay(word.proficiency, was_correct);
        let ts = to_db_time(now);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            UPDATE words
            SET proficiency = ?1,
                review_count = review_count + 1,
                correct_count = correct_count + ?2,
                wrong_count = wrong_count + ?3,
                last_review_time = ?4,
                next_review_time = ?5,
                updated_at = ?4
            WHERE id = ?6
            "#,
            params![
                next.proficiency,
                was_correct as i64,
                (!was_correct) as i64,
                ts,
                to_db_time(next.due_at(now)),
                id
            ],
        )?;
        tx.execute(
            "INSERT INTO study_log (word_id, is_correct, reviewed_at) VALUES (?1, ?2, ?3)",
            params![id, was_correct, ts],
        )?;
        tx.commit()?;

        self.get_word(id)
    }

    pub fn review_history(&self, word_id: i64) -> Result<Vec<ReviewLogEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, word_id, is_correct, reviewed_at
            FROM study_log
            WHERE word_id = ?1
            ORDER BY reviewed_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![word_id], |row| {
            Ok(ReviewLogEntry {
                id: row.get(0)?,
                word_id: row.get(1)?,
                is_correct: row.get(2)?,
                reviewed_at: parse_db_time(3, &row.get::<_, String>(3)?)?,
            })
        })?;
        rows.collect()
    }

    /// Make every word due at `now`.
    pub fn reset_review_schedule(&self, now: DateTime<Utc>) -> Result<usize> {
        self.conn.execute(
            "UPDATE words SET next_review_time = ?1",
            params![to_db_time(now)],
        )
    }

    pub fn study_stats(&self, now: DateTime<Utc>) -> Result<Stats> {
        self.conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN proficiency >= 5 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(review_count), 0),
                   COALESCE(SUM(correct_count), 0),
                   COALESCE(SUM(wrong_count), 0),
                   COALESCE(SUM(CASE WHEN next_review_time <= ?1 THEN 1 ELSE 0 END), 0)
            FROM words
            "#,
            params![to_db_time(now)],
            |row| {
                Ok(Stats {
                    total_words: row.get(0)?,
                    mastered_words: row.get(1)?,
                    total_reviews: row.get(2)?,
                    total_correct: row.get(3)?,
                    total_wrong: row.get(4)?,
                    due_now: row.get(5)?,
                })
            },
        )
    }

    /// Empty every table: words, review history and settings.
    pub fn clear_all_data(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM study_log", [])?;
        tx.execute("DELETE FROM words", [])?;
        tx.execute("DELETE FROM settings", [])?;
        tx.commit()
    }

    // Settings operations
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self.conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );

        match value {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, to_db_time(now)],
        )?;
        Ok(())
    }
}

impl WordStore for Database {
    fn get_due(&self, now: DateTime<Utc>) -> std::result::Result<Vec<Word>, StoreError> {
        Ok(self.due_words(now)?)
    }

    fn get_by_id(&self, id: i64) -> std::result::Result<Option<Word>, StoreError> {
        Ok(self.get_word(id)?)
    }

    fn apply_review_result(
        &self,
        id: i64,
        was_correct: bool,
    ) -> std::result::Result<(), StoreError> {
        match self.record_review(id, was_correct, Utc::now())? {
            Some(_) => Ok(()),
            None => Err(StoreError::WordNotFound(id)),
        }
    }

    fn get_stats(&self) -> std::result::Result<Stats, StoreError> {
        Ok(self.study_stats(Utc::now())?)
    }
}

impl SettingsStore for Database {
    fn get(&self, key: &str) -> std::result::Result<Option<Value>, StoreError> {
        match self.get_setting(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> std::result::Result<(), StoreError> {
        self.set_setting(key, &serde_json::to_string(value)?, Utc::now())?;
        Ok(())
    }
}
