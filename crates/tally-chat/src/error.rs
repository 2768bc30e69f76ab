//! Error types for the conversational core.

use tally_core::error::TallyError;

/// Errors internal to a turn. Every variant is caught at the turn boundary
/// and folded into a returned reply; none of them crosses the entry point.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("task error: {0}")]
    Task(String),
}

impl From<TallyError> for ChatError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::SessionNotFound(id) => ChatError::SessionNotFound(id),
            TallyError::Provider(msg) => ChatError::Provider(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChatError::Task(err.to_string())
    }
}
