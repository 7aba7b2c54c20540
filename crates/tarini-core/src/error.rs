//! Core error types for tarini-core.
//!
//! Everything the library can fail with is an explicit variant here; errors
//! are returned to the caller, never logged-and-swallowed inside the core.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for tarini-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// `start` was given an exercise id missing from the catalog.
    #[error("unknown exercise: {0}")]
    UnknownExercise(String),

    /// `start` was called while the controller was not idle.
    #[error("a session is already in progress")]
    SessionInProgress,

    /// Today's completed-session count has reached the daily goal.
    #[error("daily session goal already reached ({completed}/{goal})")]
    QuotaExceeded { completed: u32, goal: u32 },

    /// Persistence errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the database file
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A read from the store failed
    #[error("storage read failed: {0}")]
    ReadFailed(String),

    /// A write to the store failed
    #[error("storage write failed: {0}")]
    WriteFailed(String),

    /// Database is locked
    #[error("database is locked")]
    Locked,
}

impl StorageError {
    pub(crate) fn read(err: rusqlite::Error) -> Self {
        if is_locked(&err) {
            StorageError::Locked
        } else {
            StorageError::ReadFailed(err.to_string())
        }
    }

    pub(crate) fn write(err: rusqlite::Error) -> Self {
        if is_locked(&err) {
            StorageError::Locked
        } else {
            StorageError::WriteFailed(err.to_string())
        }
    }
}

fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
