//! Voicemail messages
//!
//! Tenant-scoped store of voicemail records. The audio itself lives with
//! the carrier's recording storage; we keep the metadata a receptionist
//! or agent needs to work the box.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use voicedesk_audit_core::CallerFingerprint;
use voicedesk_infra_common::{SessionId, TenantId};

#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct VoicemailId(pub String);

impl VoicemailId {
    pub fn new() -> Self {
        VoicemailId(format!("voicemail-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VoicemailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded voicemail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicemailMessage {
    pub id: VoicemailId,
    pub tenant_id: TenantId,
    /// Box the message landed in (department or tenant default)
    pub box_id: String,
    pub caller: CallerFingerprint,
    /// Session that captured the recording
    pub session_id: SessionId,
    pub recorded_at: DateTime<Utc>,
    /// Seconds of audio; `None` until the recording finishes
    pub duration_seconds: Option<u32>,
    pub heard: bool,
}

/// Tenant-scoped voicemail store.
pub struct VoicemailStore {
    messages: DashMap<TenantId, Vec<VoicemailMessage>>,
}

impl VoicemailStore {
    pub fn new() -> Self {
        VoicemailStore {
            messages: DashMap::new(),
        }
    }

    /// Open a message record when a recording starts.
    pub fn begin_message(
        &self,
        tenant: &TenantId,
        box_id: &str,
        caller: CallerFingerprint,
        session: &SessionId,
    ) -> VoicemailMessage {
        let message = VoicemailMessage {
            id: VoicemailId::new(),
            tenant_id: tenant.clone(),
            box_id: box_id.to_string(),
            caller,
            session_id: session.clone(),
            recorded_at: Utc::now(),
            duration_seconds: None,
            heard: false,
        };
        info!(tenant = %tenant, voicemail = %message.id, box_id, "voicemail recording opened");
        self.messages
            .entry(tenant.clone())
            .or_default()
            .push(message.clone());
        message
    }

    /// Stamp the duration once the carrier reports the recording done.
    pub fn complete_message(&self, tenant: &TenantId, session: &SessionId, duration_seconds: u32) {
        if let Some(mut messages) = self.messages.get_mut(tenant) {
            if let Some(message) = messages
                .iter_mut()
                .rev()
                .find(|m| &m.session_id == session && m.duration_seconds.is_none())
            {
                message.duration_seconds = Some(duration_seconds);
            }
        }
    }

    /// Close a session's open recording, deriving the duration from when
    /// it began.
    pub fn finish(&self, tenant: &TenantId, session: &SessionId) {
        let now = Utc::now();
        if let Some(mut messages) = self.messages.get_mut(tenant) {
            if let Some(message) = messages
                .iter_mut()
                .rev()
                .find(|m| &m.session_id == session && m.duration_seconds.is_none())
            {
                let elapsed = (now - message.recorded_at).num_seconds().max(0) as u32;
                message.duration_seconds = Some(elapsed);
            }
        }
    }

    /// Messages for a tenant, optionally narrowed to one box.
    pub fn list(&self, tenant: &TenantId, box_id: Option<&str>) -> Vec<VoicemailMessage> {
        self.messages
            .get(tenant)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| box_id.map(|b| m.box_id == b).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark a message heard. Tenant-scoped: a foreign id is a no-op.
    pub fn mark_heard(&self, tenant: &TenantId, id: &VoicemailId) -> bool {
        if let Some(mut messages) = self.messages.get_mut(tenant) {
            if let Some(message) = messages.iter_mut().find(|m| &m.id == id) {
                message.heard = true;
                return true;
            }
        }
        false
    }

    pub fn unheard_count(&self, tenant: &TenantId, box_id: &str) -> usize {
        self.messages
            .get(tenant)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.box_id == box_id && !m.heard)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop everything owned by a tenant. Used by tenant hard-deletion.
    pub fn purge_tenant(&self, tenant: &TenantId) {
        self.messages.remove(tenant);
    }
}

impl Default for VoicemailStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VoicemailStore {
        VoicemailStore::new()
    }

    #[test]
    fn message_lifecycle() {
        let store = store();
        let tenant = TenantId::from("tenant-a");
        let session = SessionId::from("session-1");
        let message = store.begin_message(
            &tenant,
            "vm-sales",
            CallerFingerprint("print".into()),
            &session,
        );
        assert!(message.duration_seconds.is_none());

        store.complete_message(&tenant, &session, 42);
        let listed = store.list(&tenant, Some("vm-sales"));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].duration_seconds, Some(42));
        assert!(!listed[0].heard);

        assert_eq!(store.unheard_count(&tenant, "vm-sales"), 1);
        assert!(store.mark_heard(&tenant, &listed[0].id));
        assert_eq!(store.unheard_count(&tenant, "vm-sales"), 0);
    }

    #[test]
    fn listing_is_tenant_and_box_scoped() {
        let store = store();
        let tenant_a = TenantId::from("tenant-a");
        let tenant_b = TenantId::from("tenant-b");
        store.begin_message(
            &tenant_a,
            "vm-sales",
            CallerFingerprint("p1".into()),
            &SessionId::from("session-1"),
        );
        store.begin_message(
            &tenant_a,
            "vm-support",
            CallerFingerprint("p2".into()),
            &SessionId::from("session-2"),
        );

        assert_eq!(store.list(&tenant_a, None).len(), 2);
        assert_eq!(store.list(&tenant_a, Some("vm-sales")).len(), 1);
        assert!(store.list(&tenant_b, None).is_empty());
    }

    #[test]
    fn foreign_tenant_cannot_mark_heard() {
        let store = store();
        let tenant_a = TenantId::from("tenant-a");
        let message = store.begin_message(
            &tenant_a,
            "vm",
            CallerFingerprint("p".into()),
            &SessionId::from("session-1"),
        );
        assert!(!store.mark_heard(&TenantId::from("tenant-b"), &message.id));
    }
}
