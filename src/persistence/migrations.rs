//! Session database migrations.
//!
//! Migrations are versioned and tracked in the `migrations` table.
//! Each migration is run exactly once, in order.

use rusqlite::Connection;

use crate::persistence::schema::{
    CREATE_MIGRATIONS_TABLE, CREATE_SESSION_STATE_TABLE, CREATE_SESSION_STATE_UPDATED_AT_INDEX,
};
use crate::persistence::StorageError;

struct Migration {
    version: i32,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_session_state_table",
    statements: &[
        CREATE_SESSION_STATE_TABLE,
        CREATE_SESSION_STATE_UPDATED_AT_INDEX,
    ],
}];

/// Latest schema version known to this build.
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

fn current_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// Runs all pending migrations, each in its own transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<(), StorageError> {
    conn.execute_batch(CREATE_MIGRATIONS_TABLE)?;

    let version = current_version(conn);
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > version).collect();

    if pending.is_empty() {
        tracing::debug!("Session schema is up to date (v{})", version);
        return Ok(());
    }

    for migration in pending {
        tracing::info!(
            "Applying session migration {} (v{})",
            migration.name,
            migration.version
        );

        let tx = conn.transaction()?;
        for statement in migration.statements {
            tx.execute_batch(statement).map_err(|e| {
                StorageError::Migration(format!("Migration {} failed: {}", migration.name, e))
            })?;
        }
        tx.execute(
            "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
            (migration.version, migration.name),
        )?;
        tx.commit()?;
    }

    tracing::info!("Session schema now at version {}", current_version(conn));
    Ok(())
}
