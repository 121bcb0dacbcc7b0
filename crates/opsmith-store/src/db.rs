//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use opsmith_core::error::OpsError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// Uses WAL mode for concurrent read/write safety. The connection is
/// wrapped in a Mutex since rusqlite Connection is not Sync.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, and runs
    /// all pending migrations.
    pub fn new(path: &Path) -> Result<Self, OpsError> {
        // Ensure parent directory exists.
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| OpsError::Storage(format!("Failed to open database: {}", e)))?;

        // Configure pragmas.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -65536;",
        )
        .map_err(|e| OpsError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };

        // Run migrations.
        db.with_conn(|conn| migrations::run_migrations(conn))?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, OpsError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| OpsError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| OpsError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.with_conn(|conn| migrations::run_migrations(conn))?;

        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// This is the primary way to interact with the database. The mutex
    /// is held for the duration of the closure. The error type is generic
    /// so callers layered above the store can thread their own errors
    /// through without wrapping.
    pub fn with_conn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<OpsError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| OpsError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a closure inside an IMMEDIATE transaction.
    ///
    /// The write lock is taken up front so concurrent callers serialize at
    /// the SQLite level. Commits on Ok, rolls back on Err or panic unwind.
    pub fn with_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<OpsError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| OpsError::Storage(format!("Database lock poisoned: {}", e)))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| OpsError::Storage(format!("Failed to begin transaction: {}", e)))?;
        let out = f(&tx)?;
        tx.commit()
            .map_err(|e| OpsError::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(out)
    }
}

// SAFETY: Database is Send+Sync because:
// 1. The rusqlite Connection is wrapped in a std::sync::Mutex
// 2. All database access goes through Mutex::lock(), ensuring exclusive access
// 3. No raw pointers or unprotected shared state
// 4. WAL mode is configured for safe concurrent reads from the OS level
unsafe impl Send for Database {}
unsafe impl Sync for Database {}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rows(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| -> Result<i64, OpsError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .map_err(|e| OpsError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_rows(&db, "money_movements"), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::new(&path).unwrap();

        assert_eq!(count_rows(&db, "invoices"), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| -> Result<(), OpsError> {
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .map_err(|e| OpsError::Storage(e.to_string()))?;
            // In-memory databases may report "memory" instead of "wal".
            assert!(
                mode == "wal" || mode == "memory",
                "Expected wal or memory, got: {}",
                mode
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_with_tx_commits_on_ok() {
        let db = Database::in_memory().unwrap();
        db.with_tx(|tx| -> Result<(), OpsError> {
            tx.execute(
                "INSERT INTO customers (id, organization_id, name, created_at)
                 VALUES ('c1', 'o1', 'Acme', 0)",
                [],
            )
            .map_err(|e| OpsError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_rows(&db, "customers"), 1);
    }

    #[test]
    fn test_with_tx_rolls_back_on_err() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), OpsError> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO customers (id, organization_id, name, created_at)
                 VALUES ('c1', 'o1', 'Acme', 0)",
                [],
            )
            .map_err(|e| OpsError::Storage(e.to_string()))?;
            Err(OpsError::Storage("forced rollback".to_string()))
        });
        assert!(result.is_err());

        assert_eq!(count_rows(&db, "customers"), 0);
    }
}
