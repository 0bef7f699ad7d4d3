//! Durable storage for users, credentials, tasks and results.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle. Every
//! access is serialized through a `Mutex<Connection>`; SQLite serializes
//! writes anyway, and the store is the single point of truth for task
//! status, so multi-statement changes go through [`Database::with_tx`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

pub mod credential_repo;
pub mod error;
pub mod migrations;
pub mod queue_repo;
pub mod result_repo;
pub mod stats_repo;
pub mod task_repo;
pub mod user_repo;

pub use error::DatabaseError;

/// Upper bound on waiting for a locked database file
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        tracing::info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction; commits only when `f` succeeds.
    pub fn with_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(out)
    }
}

/// Returns the canonical database path under the Nimbus data dir.
pub fn default_database_path() -> Option<PathBuf> {
    nimbus_config::data_dir()
        .ok()
        .map(|dir| dir.join(nimbus_config::DATABASE_FILE))
}

/// Current time as an RFC 3339 UTC string, the format of every timestamp column
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Fresh identifier for a new row
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
