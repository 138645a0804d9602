//! Inference-layer error types

use thiserror::Error;

/// Failure of a backend exchange.
///
/// Transport problems and provider rejections are kept apart because the
/// api layer maps them to the same status but callers log them differently.
/// Neither is retried here; the session actor converts both into a terminal
/// state transition.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The backend could not be reached (connect failure, timeout, broken
    /// stream).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend answered with a non-success response, or with a body
    /// that could not be understood.
    #[error("backend rejected request: {0}")]
    BackendRejected(String),
}

impl EngineError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::BackendRejected(message.into())
    }
}
