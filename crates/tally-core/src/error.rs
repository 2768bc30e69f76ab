use thiserror::Error;

/// Top-level error type for the Tally system.
///
/// Each variant covers one subsystem. Crates return `TallyError` directly;
/// the chat crate wraps it into its own `ChatError` at the orchestration
/// boundary so that the `?` operator works seamlessly across crates.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TallyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for TallyError {
    fn from(err: toml::de::Error) -> Self {
        TallyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TallyError {
    fn from(err: toml::ser::Error) -> Self {
        TallyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;
