//! Error types for transcript-store

use thiserror::Error;

/// Errors that can occur in the session storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema migration error
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Stored timestamp could not be parsed
    #[error("Invalid timestamp for session {id}: {value}")]
    InvalidTimestamp { id: String, value: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
