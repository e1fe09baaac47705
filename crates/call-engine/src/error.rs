//! Error types and handling for the call engine
//!
//! Every failure in the platform surfaces through [`EngineError`] at the
//! edge. Errors are grouped into a fixed taxonomy so the HTTP layer maps
//! them to stable status codes and callers can branch on `category()`
//! without matching every variant.
//!
//! # Error Categories
//!
//! - **Validation** — malformed input at the edge; 4xx
//! - **Auth** — missing or invalid credentials; 401/403
//! - **Quota** — tenant over budget or rate-limited; 402/429
//! - **NotFound** — tenant-scoped lookup miss; 404
//! - **Conflict** — an invariant would be violated; 409
//! - **Upstream** — carrier/AI/external failure after internal retries; 5xx
//! - **Privacy** — sanitizer rejected a write; never suppressed; 500
//! - **Internal** — should-not-happen state, logged with context; 500

use thiserror::Error;

use voicedesk_audit_core::AuditError;
use voicedesk_callback_core::CallbackError;
use voicedesk_directory_core::DirectoryError;
use voicedesk_gateway_core::GatewayError;
use voicedesk_ledger_core::LedgerError;
use voicedesk_scaling_core::ScalingError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input at the edge
    #[error("validation failed: {detail}")]
    Validation { detail: String },

    /// Missing or invalid credentials
    #[error("authentication failed: {detail}")]
    Auth { detail: String },

    /// Tenant has no remaining minute budget
    #[error("quota exhausted for tenant {tenant}")]
    QuotaExhausted { tenant: String },

    /// Per-tenant concurrent-call admission gate tripped
    #[error("capacity exhausted for tenant {tenant}: {active} active calls")]
    CapacityExhausted { tenant: String, active: u32 },

    /// Principal exceeded its request rate
    #[error("rate limited; retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// Session lookup miss or event for a finished session
    #[error("session not found: {session}")]
    SessionNotFound { session: String },

    /// Tenant is deactivated; new sessions are refused
    #[error("tenant inactive: {tenant}")]
    TenantInactive { tenant: String },

    /// Carrier webhook signature did not verify
    #[error("carrier signature rejected")]
    SignatureRejected,

    /// The spam classifier refused the caller
    #[error("call rejected as spam for tenant {tenant}")]
    SpamRejected { tenant: String },

    /// Should-not-happen state
    #[error("internal invariant violated: {detail}")]
    Internal { detail: String },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Scaling(#[from] ScalingError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl EngineError {
    pub fn validation(detail: impl Into<String>) -> Self {
        EngineError::Validation {
            detail: detail.into(),
        }
    }

    pub fn auth(detail: impl Into<String>) -> Self {
        EngineError::Auth {
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        EngineError::Internal {
            detail: detail.into(),
        }
    }

    /// Stable taxonomy bucket for this error
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::Auth { .. }
            | EngineError::SignatureRejected
            | EngineError::SpamRejected { .. } => "auth",
            EngineError::QuotaExhausted { .. }
            | EngineError::CapacityExhausted { .. }
            | EngineError::RateLimited { .. } => "quota",
            EngineError::SessionNotFound { .. } => "not_found",
            EngineError::TenantInactive { .. } => "conflict",
            EngineError::Internal { .. } => "internal",
            EngineError::Directory(e) => match e {
                DirectoryError::NotFound { .. } => "not_found",
                DirectoryError::Validation { .. } => "validation",
                DirectoryError::NoAgentAvailable => "conflict",
                _ => "conflict",
            },
            EngineError::Ledger(e) => match e {
                LedgerError::UnknownTenant { .. } => "not_found",
                LedgerError::QuotaExhausted { .. } => "quota",
                LedgerError::TenantInactive { .. } => "conflict",
                LedgerError::InvalidAmount { .. } => "validation",
            },
            EngineError::Callback(e) => match e {
                CallbackError::NotFound { .. } => "not_found",
                CallbackError::InvalidWindow { .. } => "validation",
                _ => "conflict",
            },
            EngineError::Gateway(e) => match e {
                GatewayError::EndpointNotFound { .. } => "not_found",
                GatewayError::Validation { .. } => "validation",
                _ => "upstream",
            },
            EngineError::Scaling(e) => match e {
                ScalingError::InvalidPolicy { .. } => "validation",
                ScalingError::ExecutionFailed { .. } => "upstream",
            },
            EngineError::Audit(e) => match e {
                AuditError::PrivacyViolation { .. } => "privacy",
                AuditError::TenantMismatch { .. } => "auth",
                AuditError::UnstorablePayload { .. } => "validation",
            },
        }
    }

    /// HTTP status the admin surface answers with
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Validation { .. } => 400,
            EngineError::Auth { .. } => 401,
            EngineError::SignatureRejected | EngineError::SpamRejected { .. } => 403,
            EngineError::QuotaExhausted { .. } => 402,
            EngineError::RateLimited { .. } => 429,
            EngineError::CapacityExhausted { .. } => 429,
            EngineError::SessionNotFound { .. } => 404,
            EngineError::TenantInactive { .. } => 409,
            EngineError::Internal { .. } => 500,
            _ => match self.category() {
                "not_found" => 404,
                "validation" => 400,
                "quota" => 402,
                "conflict" => 409,
                "upstream" => 502,
                "privacy" => 500,
                _ => 500,
            },
        }
    }

    /// Whether retrying the same call later can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            "quota" | "upstream" | "conflict"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http() {
        assert_eq!(EngineError::validation("bad").http_status(), 400);
        assert_eq!(EngineError::auth("no key").http_status(), 401);
        assert_eq!(EngineError::SignatureRejected.http_status(), 403);
        assert_eq!(
            EngineError::QuotaExhausted { tenant: "t".into() }.http_status(),
            402
        );
        assert_eq!(
            EngineError::RateLimited { retry_after_seconds: 5 }.http_status(),
            429
        );
        assert_eq!(
            EngineError::from(DirectoryError::NoAgentAvailable).http_status(),
            409
        );
        assert_eq!(
            EngineError::from(AuditError::privacy("ip survived")).category(),
            "privacy"
        );
        assert_eq!(
            EngineError::from(GatewayError::UpstreamFailure {
                attempts: 3,
                last_error: "timeout".into()
            })
            .http_status(),
            502
        );
    }

    #[test]
    fn recoverability_follows_category() {
        assert!(EngineError::QuotaExhausted { tenant: "t".into() }.is_recoverable());
        assert!(!EngineError::auth("bad token").is_recoverable());
    }
}
