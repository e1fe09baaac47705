//! Error types for callback-core

use thiserror::Error;

/// Result type alias for callback operations
pub type Result<T> = std::result::Result<T, CallbackError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallbackError {
    #[error("callback not found: {id}")]
    NotFound { id: String },

    /// Cancellation refused because an attempt is already running
    #[error("callback {id} has an attempt in progress")]
    AttemptInProgress { id: String },

    /// The requested status change violates the lifecycle DAG
    #[error("invalid callback transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Window bounds are inconsistent or in the past
    #[error("invalid time window: {detail}")]
    InvalidWindow { detail: String },

    /// Attempt recorded against a request with no attempt slots left
    #[error("callback {id} exhausted its {max_attempts} attempts")]
    AttemptsExhausted { id: String, max_attempts: u32 },

    /// Attempt finalized against a request that was never claimed
    #[error("callback {id} is {status}, not in_progress")]
    NotClaimed { id: String, status: &'static str },
}
