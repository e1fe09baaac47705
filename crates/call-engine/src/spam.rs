//! Spam screening
//!
//! A pluggable classifier consulted at admission. Implementations are
//! fixed at startup from configuration; there is no dynamic plugin
//! loading. The classifier sees only the caller fingerprint — never the
//! raw number.

use std::collections::HashSet;

use dashmap::DashMap;
use voicedesk_audit_core::CallerFingerprint;
use voicedesk_infra_common::TenantId;

/// Verdict for an inbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    Allow,
    Block,
}

/// Capability trait for spam screening at `session.open`.
pub trait SpamClassifier: Send + Sync {
    fn classify(&self, tenant: &TenantId, caller: &CallerFingerprint) -> SpamVerdict;
}

/// Default classifier: every call is admitted.
pub struct AllowAllClassifier;

impl SpamClassifier for AllowAllClassifier {
    fn classify(&self, _tenant: &TenantId, _caller: &CallerFingerprint) -> SpamVerdict {
        SpamVerdict::Allow
    }
}

/// Tenant-scoped blocklist over caller fingerprints.
pub struct BlocklistClassifier {
    blocked: DashMap<TenantId, HashSet<CallerFingerprint>>,
}

impl BlocklistClassifier {
    pub fn new() -> Self {
        BlocklistClassifier {
            blocked: DashMap::new(),
        }
    }

    pub fn block(&self, tenant: &TenantId, caller: CallerFingerprint) {
        self.blocked.entry(tenant.clone()).or_default().insert(caller);
    }

    pub fn unblock(&self, tenant: &TenantId, caller: &CallerFingerprint) {
        if let Some(mut set) = self.blocked.get_mut(tenant) {
            set.remove(caller);
        }
    }
}

impl Default for BlocklistClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SpamClassifier for BlocklistClassifier {
    fn classify(&self, tenant: &TenantId, caller: &CallerFingerprint) -> SpamVerdict {
        let listed = self
            .blocked
            .get(tenant)
            .map(|set| set.contains(caller))
            .unwrap_or(false);
        if listed {
            SpamVerdict::Block
        } else {
            SpamVerdict::Allow
        }
    }
}
