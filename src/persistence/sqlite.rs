//! SQLite-backed session store.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use super::migrations::run_migrations;
use super::{SessionStore, StorageError};

/// Primary session store.
///
/// A single connection is shared behind a mutex; the store is only ever
/// written by the one live interview client of a session.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and runs migrations.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created session database directory at {:?}", parent);
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StorageError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored keys.
    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM session_state", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl SessionStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let blob = self
            .conn
            .lock()
            .query_row(
                "SELECT blob FROM session_state WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(blob)
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        self.conn.lock().execute(
            r#"
            INSERT INTO session_state (key, blob, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET blob = excluded.blob, updated_at = excluded.updated_at
            "#,
            (key, blob, Utc::now().to_rfc3339()),
        )?;
        tracing::trace!("Saved {} bytes under {}", blob.len(), key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute("DELETE FROM session_state WHERE key = ?1", [key])?;
        Ok(())
    }
}
