//! Session storage trait and SQLite implementation
//!
//! Sessions are stored one row each; the message list is kept as a JSON
//! document so nested sub-sessions survive a round trip unchanged.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;
use crate::session::Session;
use crate::Result;

/// Persistent store for reconstructed transcripts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session, replacing any existing session with the same id.
    async fn add_session(&self, session: &Session) -> Result<()>;

    /// Fetch a session by id. Returns `StoreError::SessionNotFound` if absent.
    async fn get_session(&self, id: &str) -> Result<Session>;

    /// All sessions, oldest first.
    async fn list_sessions(&self) -> Result<Vec<Session>>;
}

const MIGRATIONS: &[(&str, &str)] = &[(
    "v001_sessions",
    "CREATE TABLE IF NOT EXISTS sessions (
        id             TEXT PRIMARY KEY,
        title          TEXT NOT NULL,
        created_at     TEXT NOT NULL,
        input_tokens   INTEGER NOT NULL DEFAULT 0,
        output_tokens  INTEGER NOT NULL DEFAULT 0,
        cost           REAL NOT NULL DEFAULT 0,
        tools_approved INTEGER NOT NULL DEFAULT 0,
        messages       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions (created_at);",
)];

/// SQLite-backed session store
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    for (idx, (name, sql)) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i32;
        if version > current {
            tracing::debug!(migration = %name, version, "running session store migration");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::Migration(format!("{}: {}", name, e)))?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }
    Ok(())
}

struct SessionRow {
    id: String,
    title: String,
    created_at: String,
    input_tokens: i64,
    output_tokens: i64,
    cost: f64,
    tools_approved: bool,
    messages: String,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: row.get(2)?,
            input_tokens: row.get(3)?,
            output_tokens: row.get(4)?,
            cost: row.get(5)?,
            tools_approved: row.get(6)?,
            messages: row.get(7)?,
        })
    }

    fn into_session(self) -> Result<Session> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| StoreError::InvalidTimestamp {
                id: self.id.clone(),
                value: self.created_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Session {
            messages: serde_json::from_str(&self.messages)?,
            id: self.id,
            title: self.title,
            created_at,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cost: self.cost,
            tools_approved: self.tools_approved,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, title, created_at, input_tokens, output_tokens, cost, tools_approved, messages FROM sessions";

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn add_session(&self, session: &Session) -> Result<()> {
        let messages = serde_json::to_string(&session.messages)?;
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO sessions
                (id, title, created_at, input_tokens, output_tokens, cost, tools_approved, messages)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                session.id,
                session.title,
                session.created_at.to_rfc3339(),
                session.input_tokens,
                session.output_tokens,
                session.cost,
                session.tools_approved,
                messages,
            ],
        )?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        let row = {
            let conn = self.conn();
            conn.query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id],
                SessionRow::from_row,
            )
            .optional()?
        };
        row.ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?
            .into_session()
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!("{} ORDER BY created_at ASC", SELECT_COLUMNS))?;
            let rows = stmt
                .query_map([], SessionRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(SessionRow::into_session).collect()
    }
}
