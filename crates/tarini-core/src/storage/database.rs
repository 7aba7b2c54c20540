//! SQLite-based persistence.
//!
//! Provides:
//! - The `kv` table backing the quota record (the [`StateStore`] contract)
//! - Session history and statistics

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::{data_dir, StateStore};
use crate::error::{CoreError, StorageError};

/// Final status of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    Completed,
    Aborted,
}

impl SessionOutcome {
    fn as_str(self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Aborted => "aborted",
        }
    }
}

/// One finished session, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub exercise_id: String,
    pub outcome: SessionOutcome,
    pub duration_secs: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Stats {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub aborted_sessions: u64,
    /// Seconds spent in completed sessions.
    pub practice_secs: u64,
    pub today_completed: u64,
    pub today_practice_secs: u64,
}

/// SQLite database for session history and key-value state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data_dir>/tarini.db`.
    ///
    /// Creates the file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or the database cannot be
    /// opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("tarini.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        let db = Self { conn };
        db.migrate().map_err(StorageError::write)?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let db = Self { conn };
        db.migrate().map_err(StorageError::write)?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                exercise_id   TEXT NOT NULL,
                outcome       TEXT NOT NULL,
                duration_secs INTEGER NOT NULL,
                started_at    TEXT NOT NULL,
                ended_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_ended_at ON sessions(ended_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_exercise ON sessions(exercise_id);",
        )?;
        Ok(())
    }

    /// Record a finished session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_session(
        &self,
        exercise_id: &str,
        outcome: SessionOutcome,
        duration_secs: u32,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        self.conn
            .execute(
                "INSERT INTO sessions (exercise_id, outcome, duration_secs, started_at, ended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    exercise_id,
                    outcome.as_str(),
                    duration_secs,
                    started_at.to_rfc3339(),
                    ended_at.to_rfc3339(),
                ],
            )
            .map_err(StorageError::write)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn stats_today(&self) -> Result<Stats, StorageError> {
        let cutoff = format!("{}T00:00:00+00:00", Utc::now().format("%Y-%m-%d"));
        let mut stats = self.outcome_totals(Some(&cutoff))?;
        stats.today_completed = stats.completed_sessions;
        stats.today_practice_secs = stats.practice_secs;
        Ok(stats)
    }

    pub fn stats_all(&self) -> Result<Stats, StorageError> {
        let mut stats = self.outcome_totals(None)?;
        let cutoff = format!("{}T00:00:00+00:00", Utc::now().format("%Y-%m-%d"));
        let today = self.outcome_totals(Some(&cutoff))?;
        stats.today_completed = today.completed_sessions;
        stats.today_practice_secs = today.practice_secs;
        Ok(stats)
    }

    fn outcome_totals(&self, ended_after: Option<&str>) -> Result<Stats, StorageError> {
        let sql = match ended_after {
            Some(_) => {
                "SELECT outcome, COUNT(*), COALESCE(SUM(duration_secs), 0)
                 FROM sessions
                 WHERE ended_at >= ?1
                 GROUP BY outcome"
            }
            None => {
                "SELECT outcome, COUNT(*), COALESCE(SUM(duration_secs), 0)
                 FROM sessions
                 GROUP BY outcome"
            }
        };
        let mut stmt = self.conn.prepare(sql).map_err(StorageError::read)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
            ))
        };
        let rows = match ended_after {
            Some(cutoff) => stmt
                .query_map(params![cutoff], map_row)
                .map_err(StorageError::read)?,
            None => stmt.query_map([], map_row).map_err(StorageError::read)?,
        };

        let mut stats = Stats::default();
        for row in rows {
            let (outcome, count, secs) = row.map_err(StorageError::read)?;
            stats.total_sessions += count;
            match outcome.as_str() {
                "completed" => {
                    stats.completed_sessions += count;
                    stats.practice_secs += secs;
                }
                "aborted" => {
                    stats.aborted_sessions += count;
                }
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM kv WHERE key = ?1")
            .map_err(StorageError::read)?;
        match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::read(e)),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(StorageError::write)?;
        Ok(())
    }
}

impl StateStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.kv_get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.kv_set(key, value)
    }
}
