//! Error types for audit-core

use thiserror::Error;

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuditError {
    /// The payload still contained forbidden data after sanitization.
    /// Never silently suppressed; the originating request must fail.
    #[error("privacy violation: {detail}")]
    PrivacyViolation { detail: String },

    /// A read was attempted across tenant boundaries
    #[error("tenant mismatch: event belongs to {owner}, query scoped to {requested}")]
    TenantMismatch { owner: String, requested: String },

    /// Payload could not be serialized for storage
    #[error("unstorable payload: {reason}")]
    UnstorablePayload { reason: String },
}

impl AuditError {
    pub fn privacy(detail: impl Into<String>) -> Self {
        AuditError::PrivacyViolation {
            detail: detail.into(),
        }
    }
}
