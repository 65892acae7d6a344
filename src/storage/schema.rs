//! Database schema definitions and migrations for the relational backend.
//!
//! The index is disposable: a database written by an unknown (newer) schema
//! is wiped and recreated instead of migrated.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let mut current_version = get_current_version(conn)?;
    tracing::debug!(
        current = current_version,
        target = SCHEMA_VERSION,
        "Checking database migrations"
    );

    if current_version > SCHEMA_VERSION {
        tracing::warn!(
            found = current_version,
            supported = SCHEMA_VERSION,
            "Unknown index format, rebuilding"
        );
        drop_all(conn)?;
        current_version = 0;
    }

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Remove every indexed entry, keeping the schema.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn reset(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM entries", [])
        .map_err(|e| StorageError::Database(format!("failed to reset entries: {e}")))?;
    Ok(())
}

/// Get the current schema version.
pub(crate) fn get_current_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(StorageError::Migration(format!("failed to get version: {e}")).into()),
    }
}

fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![version, chrono::Utc::now().timestamp()],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;

    Ok(())
}

fn drop_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        DROP TABLE IF EXISTS entries;
        DELETE FROM schema_migrations;
        ",
    )
    .map_err(|e| StorageError::Migration(format!("failed to drop old schema: {e}")))?;
    Ok(())
}

/// Migration v1: entries table keyed by the encoded path key.
fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v1: entries table");

    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS entries (
            key BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            is_dir INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        ) WITHOUT ROWID;
        ",
    )
    .map_err(|e| StorageError::Migration(format!("v1 migration failed: {e}")))?;

    record_migration(conn, 1)?;
    Ok(())
}

/// Verify all expected tables exist.
///
/// # Errors
///
/// Returns an error if any expected table is missing from the schema.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in ["entries", "schema_migrations"] {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
                [table],
                |_| Ok(true),
            )
            .unwrap_or(false);

        if !exists {
            return Err(StorageError::Migration(format!("table '{table}' not found")).into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_migrate_empty_database() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            verify_schema(conn)?;
            assert_eq!(get_current_version(conn)?, SCHEMA_VERSION);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_migrate_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            migrate(conn)?;
            verify_schema(conn)?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_newer_version_is_rebuilt() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            conn.execute(
                "INSERT INTO entries (key, name, is_dir, updated_at) VALUES (?, ?, 0, 0)",
                rusqlite::params![b"file:/a".to_vec(), "/a"],
            )
            .unwrap();
            record_migration(conn, SCHEMA_VERSION + 1)?;

            migrate(conn)?;

            assert_eq!(get_current_version(conn)?, SCHEMA_VERSION);
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_reset_keeps_schema() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            conn.execute(
                "INSERT INTO entries (key, name, is_dir, updated_at) VALUES (?, ?, 1, 0)",
                rusqlite::params![b"dir:/a/".to_vec(), "/a"],
            )
            .unwrap();

            reset(conn)?;
            verify_schema(conn)?;

            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }
}
