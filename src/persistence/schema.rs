//! Database schema definitions for the session store.

/// SQL statement to create the migrations tracking table.
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQL statement to create the session state table.
pub const CREATE_SESSION_STATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS session_state (
    key TEXT PRIMARY KEY,
    blob TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Index on updated_at for pruning stale sessions.
pub const CREATE_SESSION_STATE_UPDATED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_session_state_updated_at ON session_state(updated_at);
"#;
