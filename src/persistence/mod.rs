//! Session state persistence.
//!
//! The queue and conversation managers persist an opaque JSON blob per
//! session through the `SessionStore` trait. The default stack is a SQLite
//! primary store (`~/.viva/viva.db`) backed by a JSON-file secondary store
//! (`~/.viva/sessions/`) that takes over whenever the primary is unreachable.
//!
//! Concurrent writers to the same key are not coordinated: last write wins.

pub mod fallback;
pub mod json_file;
pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

pub use fallback::FallbackStore;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::StorageConfig;

/// Persistence error types.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Key-value store for per-session JSON blobs.
pub trait SessionStore: Send + Sync {
    /// Returns the blob stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `blob` under `key`, replacing any previous value.
    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError>;

    /// Removes the blob stored under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn SessionStore>;

/// Storage key for a session's question queue.
pub fn queue_key(session_id: &str) -> String {
    format!("queue:{}", session_id)
}

/// Storage key for a session's conversation state.
pub fn conversation_key(session_id: &str) -> String {
    format!("conversation:{}", session_id)
}

/// Returns the viva data directory (~/.viva).
pub fn data_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| {
            tracing::error!("Could not determine home directory, using /tmp");
            PathBuf::from("/tmp")
        })
        .join(".viva")
}

/// Builds the default store stack from configuration.
///
/// If the SQLite database cannot be opened the JSON-file store is used on its
/// own; the interview flow never fails because of persistence.
pub fn open_default_store(config: &StorageConfig) -> SharedStore {
    let fallback_dir = config
        .fallback_dir
        .clone()
        .unwrap_or_else(|| data_directory().join("sessions"));
    let secondary: SharedStore = Arc::new(JsonFileStore::new(fallback_dir));

    let db_path = config
        .database_path
        .clone()
        .unwrap_or_else(|| data_directory().join("viva.db"));

    match SqliteStore::open(&db_path) {
        Ok(primary) => {
            tracing::info!("Session store: sqlite at {:?} with file fallback", db_path);
            Arc::new(FallbackStore::new(Arc::new(primary), secondary))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to open session database at {:?}, using file store only: {}",
                db_path,
                e
            );
            secondary
        }
    }
}
