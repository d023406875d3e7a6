//! Error types for timeclock-core

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using timeclock-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in timeclock-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A log action was attempted with no signed-in identity
    #[error("User is not authenticated")]
    NotAuthenticated,

    /// Reading the user's log failed
    #[error("Failed to read attendance log: {0}")]
    Read(#[source] StoreError),

    /// Appending to the user's log failed
    #[error("Failed to append attendance log entry: {0}")]
    Write(#[source] StoreError),

    /// A background task could not be spawned or did not complete
    #[error("Async runtime error: {0}")]
    Runtime(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error came from the document store rather than the caller.
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }
}
