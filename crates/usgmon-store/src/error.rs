//! Store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a usage store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected an operation.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file or its directory could not be prepared.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A scan id that was never started.
    #[error("Unknown scan: {scan_id}")]
    UnknownScan { scan_id: String },

    /// A previous holder of the connection panicked.
    #[error("Database connection poisoned")]
    Poisoned,

    /// The blocking task running a store call died.
    #[error("Store task failed: {message}")]
    Task { message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
