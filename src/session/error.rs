//! Session operation errors

use crate::llm::EngineError;
use thiserror::Error;

/// Why a session operation was refused or failed.
///
/// The api layer maps these onto HTTP statuses; nothing here is retried
/// internally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The message text trimmed to nothing
    #[error("message must not be empty")]
    EmptyInput,

    /// A response is already being generated for this session
    #[error("session is busy, try again once the current response completes")]
    Busy,

    /// A configuration update carried an unusable value
    #[error("{0}")]
    InvalidConfig(String),

    /// The inference layer failed; the session has already been returned
    /// to idle
    #[error(transparent)]
    Backend(#[from] EngineError),

    /// The session's actor task is gone
    #[error("session is no longer running")]
    Closed,
}
