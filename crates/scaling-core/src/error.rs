//! Error types for scaling-core

use thiserror::Error;

/// Result type alias for scaling operations
pub type Result<T> = std::result::Result<T, ScalingError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScalingError {
    #[error("invalid policy: {detail}")]
    InvalidPolicy { detail: String },

    #[error("scaling execution failed: {detail}")]
    ExecutionFailed { detail: String },
}
