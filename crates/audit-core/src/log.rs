//! Append-only audit log
//!
//! Tenant-scoped, in-process event trail. Writes run the sanitizer and a
//! post-sanitization verification; a payload that cannot be scrubbed clean
//! is rejected rather than stored. Reads never cross tenant boundaries.

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use voicedesk_infra_common::{CorrelationId, TenantId};

use crate::error::{AuditError, Result};
use crate::events::{AuditEvent, AuditEventType, EventDraft, QueryFilter};
use crate::fingerprint::FingerprintHasher;
use crate::sanitizer::{contains_forbidden_pattern, sanitize_string, sanitize_value};

/// Privacy-compliant append-only audit log.
///
/// Cheap to clone handles are not provided; share it behind an `Arc`.
pub struct AuditLog {
    events: DashMap<TenantId, Vec<AuditEvent>>,
    hasher: FingerprintHasher,
}

impl AuditLog {
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        AuditLog {
            events: DashMap::new(),
            hasher: FingerprintHasher::new(salt),
        }
    }

    /// Append an event for a tenant.
    ///
    /// The draft's payload and error message are sanitized, actor/session
    /// identifiers are replaced by salted hashes, and the serialized result
    /// is verified to be free of forbidden patterns. Returns the stored
    /// event.
    pub fn emit(&self, tenant_id: &TenantId, draft: EventDraft) -> Result<AuditEvent> {
        let payload = sanitize_value(&draft.payload);
        let error_message = draft.error_message.as_deref().map(sanitize_string);

        let serialized = serde_json::to_string(&payload).map_err(|e| {
            AuditError::UnstorablePayload {
                reason: e.to_string(),
            }
        })?;
        if contains_forbidden_pattern(&serialized) {
            warn!(tenant = %tenant_id, action = %draft.action,
                  "audit write rejected: payload not clean after sanitization");
            return Err(AuditError::privacy(format!(
                "payload for action '{}' retained a forbidden pattern",
                draft.action
            )));
        }
        if let Some(msg) = &error_message {
            if contains_forbidden_pattern(msg) {
                return Err(AuditError::privacy(format!(
                    "error message for action '{}' retained a forbidden pattern",
                    draft.action
                )));
            }
        }

        let mut entry = self.events.entry(tenant_id.clone()).or_default();
        let sequence = entry.len() as u64;
        let event = AuditEvent {
            tenant_id: tenant_id.clone(),
            sequence,
            event_type: draft.event_type,
            action: draft.action,
            actor: draft.actor.map(|a| self.hasher.fingerprint(&a).0),
            session: draft.session.map(|s| self.hasher.fingerprint(&s).0),
            correlation_id: draft.correlation_id.unwrap_or_else(CorrelationId::new),
            payload,
            success: draft.success,
            error_message,
            recorded_at: Utc::now(),
        };
        debug!(tenant = %tenant_id, seq = sequence, action = %event.action, "audit event appended");
        entry.push(event.clone());
        Ok(event)
    }

    /// Tenant-scoped read. Events for other tenants are never returned.
    pub fn query(&self, tenant_id: &TenantId, filter: QueryFilter) -> Vec<AuditEvent> {
        let Some(entry) = self.events.get(tenant_id) else {
            return Vec::new();
        };
        let mut out: Vec<AuditEvent> = entry
            .iter()
            .filter(|e| {
                filter
                    .event_type
                    .map(|t| e.event_type == t)
                    .unwrap_or(true)
                    && filter.since.map(|s| e.recorded_at >= s).unwrap_or(true)
                    && filter.until.map(|u| e.recorded_at <= u).unwrap_or(true)
            })
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }

    /// Number of events stored for a tenant
    pub fn len(&self, tenant_id: &TenantId) -> usize {
        self.events.get(tenant_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Drop all events owned by a tenant. Used by tenant hard-deletion.
    pub fn purge_tenant(&self, tenant_id: &TenantId) {
        self.events.remove(tenant_id);
    }

    /// Count events of a given type for a tenant
    pub fn count_by_type(&self, tenant_id: &TenantId, event_type: AuditEventType) -> usize {
        self.events
            .get(tenant_id)
            .map(|v| v.iter().filter(|e| e.event_type == event_type).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log() -> AuditLog {
        AuditLog::new("test-salt")
    }

    #[test]
    fn emit_stores_sanitized_payload() {
        let log = log();
        let tenant = TenantId::from("tenant-a");
        let event = log
            .emit(
                &tenant,
                EventDraft::new(AuditEventType::CallCompleted, "session_close")
                    .with_payload(json!({ "client_ip": "192.168.1.1", "duration": 42 })),
            )
            .unwrap();
        assert_eq!(event.payload["client_ip"], json!("[REDACTED_IP]"));
        assert_eq!(event.payload["duration"], json!(42));
    }

    #[test]
    fn network_address_in_free_text_never_reaches_storage() {
        let log = log();
        let tenant = TenantId::from("tenant-a");
        let event = log
            .emit(
                &tenant,
                EventDraft::new(AuditEventType::SecurityEvent, "probe")
                    .with_payload(json!({ "note": "request from 10.0.0.1 was refused" })),
            )
            .unwrap();
        let rendered = event.payload.to_string();
        assert!(!rendered.contains("10.0.0.1"));
        assert!(rendered.contains("[REDACTED_LOCATION]"));
    }

    #[test]
    fn actor_is_stored_hashed() {
        let log = log();
        let tenant = TenantId::from("tenant-a");
        let event = log
            .emit(
                &tenant,
                EventDraft::new(AuditEventType::DataAccess, "lookup").with_actor("5551234567"),
            )
            .unwrap();
        assert!(event.actor.is_some());
        assert!(!event.actor.unwrap().contains("5551234567"));
    }

    #[test]
    fn reads_are_tenant_scoped() {
        let log = log();
        let a = TenantId::from("tenant-a");
        let b = TenantId::from("tenant-b");
        log.emit(&a, EventDraft::new(AuditEventType::DataAccess, "read-a"))
            .unwrap();
        log.emit(&b, EventDraft::new(AuditEventType::DataAccess, "read-b"))
            .unwrap();

        let for_a = log.query(&a, QueryFilter::default());
        assert_eq!(for_a.len(), 1);
        assert!(for_a.iter().all(|e| e.tenant_id == a));
    }

    #[test]
    fn sequence_is_monotonic_per_tenant() {
        let log = log();
        let tenant = TenantId::from("tenant-a");
        for i in 0..5 {
            let event = log
                .emit(
                    &tenant,
                    EventDraft::new(AuditEventType::DataAccess, format!("op-{}", i)),
                )
                .unwrap();
            assert_eq!(event.sequence, i as u64);
        }
    }

    #[test]
    fn purge_removes_tenant_events() {
        let log = log();
        let tenant = TenantId::from("tenant-a");
        log.emit(&tenant, EventDraft::new(AuditEventType::DataAccess, "op"))
            .unwrap();
        log.purge_tenant(&tenant);
        assert_eq!(log.len(&tenant), 0);
    }
}
