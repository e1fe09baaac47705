//! Directory entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voicedesk_infra_common::{AgentId, BusinessHours, DepartmentId, TenantId};

/// Agent availability status
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    Away,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Away => "away",
            AgentStatus::Offline => "offline",
        }
    }
}

/// Where a call goes when no agent can take it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTarget {
    Voicemail,
    CallbackCapture,
}

/// A customer organization — the top-level isolation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub active: bool,
    /// Monthly minute budget, in seconds
    pub monthly_limit_seconds: i64,
    /// Day of month the billing cycle rolls over
    pub billing_anchor_day: u32,
    /// Admission gate for concurrent sessions
    pub max_concurrent_calls: u32,
    /// AI turns before the orchestrator forces routing
    pub max_transfer_attempts: u32,
    /// Routing fallback when no agent is available
    pub fallback: FallbackTarget,
    /// Carrier numbers (DIDs) owned by this tenant
    pub dids: Vec<String>,
    /// Feature flags enabled for this tenant
    pub feature_flags: Vec<String>,
    pub business_hours: BusinessHours,
}

impl Tenant {
    /// A tenant with workable defaults; callers override what they need.
    pub fn new(id: TenantId, name: impl Into<String>) -> Self {
        Tenant {
            id,
            name: name.into(),
            active: true,
            monthly_limit_seconds: 3600 * 100,
            billing_anchor_day: 1,
            max_concurrent_calls: 50,
            max_transfer_attempts: 3,
            fallback: FallbackTarget::Voicemail,
            dids: Vec::new(),
            feature_flags: Vec::new(),
            business_hours: BusinessHours::default(),
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.feature_flags.iter().any(|f| f == flag)
    }
}

/// A tenant-scoped routing bucket (sales, support, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Voicemail box calls fall back into
    pub voicemail_box: String,
    /// Overrides the tenant business hours when set
    pub hours_override: Option<BusinessHours>,
}

/// An agent able to take bridged calls.
///
/// Invariant: `0 <= current_calls <= capacity`. Status moves between
/// `Available` and `Busy` only together with a call-count change, which is
/// why those transitions live on [`crate::AgentRegistry`] rather than here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub department_id: Option<DepartmentId>,
    pub display_name: String,
    /// Unique within the tenant
    pub extension: String,
    pub status: AgentStatus,
    pub current_calls: u32,
    /// Max concurrent calls, usually 1
    pub capacity: u32,
    pub skills: Vec<String>,
    pub languages: Vec<String>,
    /// Integer routing weight, >= 1; higher wins
    pub routing_weight: u32,
    pub work_schedule: BusinessHours,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        tenant_id: TenantId,
        display_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Agent {
            id,
            tenant_id,
            department_id: None,
            display_name: display_name.into(),
            extension: extension.into(),
            status: AgentStatus::Offline,
            current_calls: 0,
            capacity: 1,
            skills: Vec::new(),
            languages: Vec::new(),
            routing_weight: 1,
            work_schedule: BusinessHours::always(),
            last_call_at: None,
        }
    }

    /// Whether this agent's skills cover every required skill
    pub fn covers_skills(&self, required: &[String]) -> bool {
        required.iter().all(|skill| self.skills.contains(skill))
    }

    /// Whether this agent speaks every required language
    pub fn covers_languages(&self, required: &[String]) -> bool {
        required.iter().all(|lang| self.languages.contains(lang))
    }

    pub fn has_free_capacity(&self) -> bool {
        self.current_calls < self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_superset_check() {
        let mut agent = Agent::new(
            AgentId::from("agent-1"),
            TenantId::from("tenant-a"),
            "Alice",
            "1001",
        );
        agent.skills = vec!["english".into(), "billing".into()];
        assert!(agent.covers_skills(&["billing".to_string()]));
        assert!(!agent.covers_skills(&["spanish".to_string()]));
        assert!(agent.covers_skills(&[]));
    }

    #[test]
    fn tenant_defaults_are_sane() {
        let tenant = Tenant::new(TenantId::from("tenant-a"), "Acme");
        assert!(tenant.active);
        assert!(tenant.max_concurrent_calls > 0);
        assert_eq!(tenant.fallback, FallbackTarget::Voicemail);
    }
}
