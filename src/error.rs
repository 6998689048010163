use thiserror::Error;

/// Rejected settings input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Study interval must be a positive number of seconds, got {0}")]
    InvalidInterval(i64),

    #[error("Study interval must be numeric, got '{0}'")]
    NotNumeric(String),

    #[error("Setting '{key}' expects true or false, got '{value}'")]
    InvalidFlag { key: String, value: String },

    #[error("Unknown setting '{0}'")]
    UnknownKey(String),
}

/// A Word Store or Settings Store call failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Word {0} not found")]
    WordNotFound(i64),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// An operation that is not valid in the scheduler's current state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Study mode is already running")]
    AlreadyRunning,

    #[error("Study mode is not running")]
    NotRunning,

    #[error("A review is already in progress")]
    ReviewInProgress,
}

/// The presentation collaborator could not take a word.
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("Presenter unavailable: {0}")]
    Unavailable(String),
}
