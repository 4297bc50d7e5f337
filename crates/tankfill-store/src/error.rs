//! Error types for tankfill-store.

use std::path::PathBuf;

/// Result type for tankfill-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tankfill-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create the database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The database was written by a newer version.
    #[error("Unsupported schema version {found} (newest known is {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for tankfill_core::Error {
    fn from(err: Error) -> Self {
        tankfill_core::Error::storage(err)
    }
}
