//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// True when a UNIQUE constraint rejected the write
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}
