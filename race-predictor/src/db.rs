// SQLite persistence layer for lucky-draw state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::prize::draw::{DrawMethod, DrawRecord, DrawState};

/// SQLite-backed persistence for draw winners, the all-time winner list,
/// and key-value session state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS draw_winners (
                session_id TEXT NOT NULL,
                category   TEXT NOT NULL,
                winner     TEXT NOT NULL,
                pool       TEXT NOT NULL,
                method     TEXT NOT NULL,
                drawn_at   TEXT NOT NULL,
                PRIMARY KEY (session_id, category)
            );

            CREATE TABLE IF NOT EXISTS all_time_winners (
                session_id TEXT NOT NULL,
                name       TEXT NOT NULL,
                PRIMARY KEY (session_id, name)
            );

            CREATE TABLE IF NOT EXISTS session_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Draw winners
    // ------------------------------------------------------------------

    /// Record a settled draw and add the winner to the session's all-time
    /// list. INSERT OR IGNORE keeps the first winner of a category.
    pub fn record_draw(&self, record: &DrawRecord, session_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let pool_json =
            serde_json::to_string(&record.pool).context("failed to serialize draw pool")?;
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(
            "INSERT OR IGNORE INTO draw_winners
                (session_id, category, winner, pool, method, drawn_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                record.category,
                record.winner,
                pool_json,
                record.method.as_str(),
                record.drawn_at.to_rfc3339(),
            ],
        )
        .context("failed to record draw winner")?;
        tx.execute(
            "INSERT OR IGNORE INTO all_time_winners (session_id, name) VALUES (?1, ?2)",
            params![session_id, record.winner],
        )
        .context("failed to record all-time winner")?;
        tx.commit().context("failed to commit record_draw")?;
        Ok(())
    }

    /// Current-run draw records for a session, ordered by draw time.
    pub fn load_draws(&self, session_id: &str) -> Result<Vec<DrawRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT category, winner, pool, method, drawn_at
                 FROM draw_winners WHERE session_id = ?1 ORDER BY drawn_at",
            )
            .context("failed to prepare load_draws query")?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("failed to query draw winners")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draw winner rows")?;

        rows.into_iter()
            .map(|(category, winner, pool_json, method, drawn_at)| {
                let pool: Vec<String> = serde_json::from_str(&pool_json)
                    .with_context(|| format!("bad pool stored for '{category}'"))?;
                let method = DrawMethod::from_str_method(&method)
                    .ok_or_else(|| anyhow!("unknown draw method '{method}' for '{category}'"))?;
                let drawn_at = DateTime::parse_from_rfc3339(&drawn_at)
                    .with_context(|| format!("bad draw timestamp for '{category}'"))?
                    .with_timezone(&Utc);
                Ok(DrawRecord {
                    category,
                    winner,
                    pool,
                    method,
                    drawn_at,
                })
            })
            .collect()
    }

    /// Every participant who has won in this session, sorted by name.
    pub fn load_all_time_winners(&self, session_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM all_time_winners WHERE session_id = ?1 ORDER BY name")
            .context("failed to prepare load_all_time_winners query")?;
        let names = stmt
            .query_map(params![session_id], |row| row.get(0))
            .context("failed to query all-time winners")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to map all-time winner rows")?;
        Ok(names)
    }

    /// Rebuild the in-memory draw state for a session.
    pub fn load_draw_state(&self, session_id: &str) -> Result<DrawState> {
        let records = self.load_draws(session_id)?;
        let all_time = self.load_all_time_winners(session_id)?;
        Ok(DrawState::restore(records, all_time))
    }

    /// Forget the current run's winners but keep the all-time list.
    pub fn clear_run_winners(&self, session_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM draw_winners WHERE session_id = ?1",
            params![session_id],
        )
        .context("failed to clear run winners")?;
        Ok(())
    }

    /// Delete everything recorded for a session. Other sessions are untouched.
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(
            "DELETE FROM draw_winners WHERE session_id = ?1",
            params![session_id],
        )
        .context("failed to delete draw winners")?;
        tx.execute(
            "DELETE FROM all_time_winners WHERE session_id = ?1",
            params![session_id],
        )
        .context("failed to delete all-time winners")?;
        tx.commit().context("failed to commit clear_session")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Key-value session state
    // ------------------------------------------------------------------

    /// Persist an arbitrary JSON value under `key`, replacing any previous one.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO session_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    pub fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM session_state WHERE key = ?1", params![key])
            .context("failed to delete state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM session_state WHERE key = ?1")
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query session state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value: serde_json::Value = serde_json::from_str(&json_str)
                    .context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Session ID management
    // ------------------------------------------------------------------

    const SESSION_ID_KEY: &'static str = "current_session_id";

    pub fn get_session_id(&self) -> Result<Option<String>> {
        let value = self.load_state(Self::SESSION_ID_KEY)?;
        Ok(value.and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub fn set_session_id(&self, session_id: &str) -> Result<()> {
        self.save_state(
            Self::SESSION_ID_KEY,
            &serde_json::Value::String(session_id.to_string()),
        )
    }

    /// New session ID from the current UTC time,
    /// e.g. `session_20261019_143022_123`.
    pub fn generate_session_id() -> String {
        Utc::now().format("session_%Y%m%d_%H%M%S_%3f").to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
