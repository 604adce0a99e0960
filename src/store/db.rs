//! SQLite database handle — connection wrapper and migrations.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::DatabaseError;

/// Shared database handle wrapping a SQLite connection behind a Mutex.
///
/// rusqlite `Connection` is `!Sync`, so all access is serialized.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Open(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| DatabaseError::Open(format!("{}: {}", path.display(), e)))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|e| DatabaseError::Open(e.to_string()))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a lock on the underlying connection.
    ///
    /// Callers hold the lock for the duration of their DB operation.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run all schema migrations.
    fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS lists (
                id TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                hidden INTEGER NOT NULL DEFAULT 0,
                locked INTEGER NOT NULL DEFAULT 0,
                subscribers_only INTEGER NOT NULL DEFAULT 0,
                posters TEXT NOT NULL DEFAULT '[]',
                bcc TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lists_address ON lists(address);

            CREATE TABLE IF NOT EXISTS subscriptions (
                list_id TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
                address TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (list_id, address)
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_address ON subscriptions(address);",
        )?;

        debug!("Database migrations complete");
        Ok(())
    }
}
