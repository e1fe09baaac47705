//! Error types for gateway-core

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("endpoint not found: {id}")]
    EndpointNotFound { id: String },

    #[error("no endpoints registered")]
    EmptyPool,

    /// Every endpoint was tried and failed
    #[error("upstream failure after {attempts} attempts: {last_error}")]
    UpstreamFailure { attempts: u32, last_error: String },

    #[error("endpoint validation failed: {detail}")]
    Validation { detail: String },
}
