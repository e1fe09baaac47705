//! Audit event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voicedesk_infra_common::{CorrelationId, TenantId};

/// Classification of audit events
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    CallInitiated,
    CallCompleted,
    CallbackCreated,
    CallbackAttempted,
    AgentStatusChanged,
    CreditAdjusted,
    CreditWarning,
    ScalingAction,
    FailoverAction,
    DataAccess,
    DataModification,
    SystemConfiguration,
    SecurityEvent,
    PrivacyViolation,
}

/// A stored, sanitized audit record.
///
/// Actor and session identifiers are salted hashes by the time they land
/// here; the payload has passed the sanitizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    /// Per-tenant monotonic sequence number
    pub sequence: u64,
    pub event_type: AuditEventType,
    /// Action performed, e.g. "session_close"
    pub action: String,
    /// Hashed actor identifier, if any
    pub actor: Option<String>,
    /// Hashed session identifier, if any
    pub session: Option<String>,
    pub correlation_id: CorrelationId,
    /// Sanitized event payload
    pub payload: serde_json::Value,
    pub success: bool,
    /// Sanitized error message if the action failed
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Input to [`crate::AuditLog::emit`], before sanitization and hashing.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: AuditEventType,
    pub action: String,
    pub actor: Option<String>,
    pub session: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    pub payload: serde_json::Value,
    pub success: bool,
    pub error_message: Option<String>,
}

impl EventDraft {
    pub fn new(event_type: AuditEventType, action: impl Into<String>) -> Self {
        EventDraft {
            event_type,
            action: action.into(),
            actor: None,
            session: None,
            correlation_id: None,
            payload: serde_json::Value::Null,
            success: true,
            error_message: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }
}

/// Filter for tenant-scoped audit queries
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub event_type: Option<AuditEventType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
