//! Error types for jotter-core

use thiserror::Error;

/// Result type alias using jotter-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in jotter-core operations
///
/// Only `Validation` and `NotFound` are produced by the note service for
/// caller mistakes; sync failures are reported asynchronously as events.
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any state change
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Note unknown or tombstoned
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
