//! Error types for the mesa matching engine.

use thiserror::Error;

/// Result type alias using mesa's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mesa operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Backing-store operation failed (wraps sqlx::Error). Propagated upward
    /// unchanged everywhere except the score-ledger adjustment call site,
    /// which logs and swallows it.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found (proposal, profile, availability)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not a party to the proposal / not the resource owner
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation conflicts with a terminal proposal state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid input (malformed time label, bad date, empty slot set)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (missing or malformed environment variable)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// True when the underlying database error is a unique-constraint
    /// violation (Postgres SQLSTATE 23505). Proposal creation uses this to
    /// detect a concurrent refresh that already proposed the same pair.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}
