//! Error types for directory-core

use thiserror::Error;

/// Result type alias for directory operations
pub type Result<T> = std::result::Result<T, DirectoryError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DirectoryError {
    /// Tenant-scoped lookup miss
    #[error("not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested status change is not permitted
    #[error("invalid transition for agent {agent}: {detail}")]
    InvalidTransition { agent: String, detail: String },

    /// Reserve on an agent already at capacity
    #[error("agent {agent} is at capacity ({capacity})")]
    AgentAtCapacity { agent: String, capacity: u32 },

    /// No agent matched the routing criteria
    #[error("no agent available")]
    NoAgentAvailable,

    /// Extension already taken within the tenant
    #[error("extension {extension} already assigned in tenant {tenant}")]
    ExtensionTaken { tenant: String, extension: String },

    /// Invalid entity data
    #[error("validation failed: {detail}")]
    Validation { detail: String },
}

impl DirectoryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DirectoryError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        DirectoryError::Validation {
            detail: detail.into(),
        }
    }
}
