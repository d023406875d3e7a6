use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] timeclock_core::Error),
    #[error(transparent)]
    Store(#[from] timeclock_core::StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Not signed in. Run `timeclock auth login --email <EMAIL> --password <PASSWORD>`, or pass --uid for a local database."
    )]
    NotSignedIn,
    #[error("{kind} at {timestamp} is shown locally but was not saved: {reason}")]
    PunchNotSaved {
        kind: String,
        timestamp: String,
        reason: String,
    },
}
