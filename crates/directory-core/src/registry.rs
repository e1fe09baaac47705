//! Agent registry
//!
//! Owns all agent mutation. `reserve`/`release` are the only way an agent
//! moves between `Available` and `Busy`: the status flip and the
//! call-count delta happen under one map-entry lock, which is what keeps
//! `0 <= current_calls <= capacity` true under concurrent routing.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use voicedesk_infra_common::{AgentId, DepartmentId, TenantId};

use crate::error::{DirectoryError, Result};
use crate::types::{Agent, AgentStatus};

/// Concurrent, tenant-scoped agent store.
pub struct AgentRegistry {
    agents: DashMap<AgentId, Agent>,
    /// Tenant -> member agent ids
    by_tenant: DashMap<TenantId, Vec<AgentId>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        AgentRegistry {
            agents: DashMap::new(),
            by_tenant: DashMap::new(),
        }
    }

    /// Insert or replace an agent. Validates capacity, weight, and
    /// per-tenant extension uniqueness.
    pub fn upsert_agent(&self, agent: Agent) -> Result<()> {
        if agent.capacity == 0 {
            return Err(DirectoryError::validation("capacity must be >= 1"));
        }
        if agent.routing_weight == 0 {
            return Err(DirectoryError::validation("routing weight must be >= 1"));
        }
        if agent.extension.is_empty() {
            return Err(DirectoryError::validation("extension must not be empty"));
        }

        // Extension uniqueness within the tenant
        if let Some(members) = self.by_tenant.get(&agent.tenant_id) {
            for other_id in members.iter() {
                if other_id == &agent.id {
                    continue;
                }
                if let Some(other) = self.agents.get(other_id) {
                    if other.extension == agent.extension {
                        return Err(DirectoryError::ExtensionTaken {
                            tenant: agent.tenant_id.to_string(),
                            extension: agent.extension.clone(),
                        });
                    }
                }
            }
        }

        let is_new = !self.agents.contains_key(&agent.id);
        if is_new {
            self.by_tenant
                .entry(agent.tenant_id.clone())
                .or_default()
                .push(agent.id.clone());
        }
        info!(agent = %agent.id, tenant = %agent.tenant_id, new = is_new, "agent upserted");
        self.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    /// Remove an agent. Tenant-scoped: a wrong tenant id is a lookup miss.
    pub fn remove_agent(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<Agent> {
        self.get_agent(tenant, agent_id)?;
        let (_, agent) = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| DirectoryError::not_found("agent", agent_id.to_string()))?;
        if let Some(mut members) = self.by_tenant.get_mut(tenant) {
            members.retain(|id| id != agent_id);
        }
        Ok(agent)
    }

    /// Tenant-scoped lookup
    pub fn get_agent(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<Agent> {
        match self.agents.get(agent_id) {
            Some(agent) if &agent.tenant_id == tenant => Ok(agent.clone()),
            _ => Err(DirectoryError::not_found("agent", agent_id.to_string())),
        }
    }

    /// Change an agent's status.
    ///
    /// Transitions between `Available` and `Busy` must co-occur with a
    /// call-count delta, so they are only reachable through
    /// [`reserve`](Self::reserve) / [`release`](Self::release); asking for
    /// them here is an [`DirectoryError::InvalidTransition`].
    pub fn set_status(
        &self,
        tenant: &TenantId,
        agent_id: &AgentId,
        new_status: AgentStatus,
    ) -> Result<()> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .filter(|a| &a.tenant_id == tenant)
            .ok_or_else(|| DirectoryError::not_found("agent", agent_id.to_string()))?;

        let old = agent.status;
        let call_coupled = matches!(
            (old, new_status),
            (AgentStatus::Available, AgentStatus::Busy) | (AgentStatus::Busy, AgentStatus::Available)
        );
        if call_coupled {
            return Err(DirectoryError::InvalidTransition {
                agent: agent_id.to_string(),
                detail: format!(
                    "{} -> {} requires a call-count change; use reserve/release",
                    old.as_str(),
                    new_status.as_str()
                ),
            });
        }
        if new_status == AgentStatus::Available && agent.current_calls >= agent.capacity {
            return Err(DirectoryError::InvalidTransition {
                agent: agent_id.to_string(),
                detail: "cannot mark available at full capacity".to_string(),
            });
        }

        agent.status = new_status;
        debug!(agent = %agent_id, from = old.as_str(), to = new_status.as_str(), "agent status changed");
        Ok(())
    }

    /// Atomically claim one unit of an agent's capacity.
    ///
    /// Fails with [`DirectoryError::AgentAtCapacity`] when
    /// `current_calls == capacity`; callers racing here retry selection.
    pub fn reserve(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<()> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .filter(|a| &a.tenant_id == tenant)
            .ok_or_else(|| DirectoryError::not_found("agent", agent_id.to_string()))?;

        if agent.current_calls >= agent.capacity {
            return Err(DirectoryError::AgentAtCapacity {
                agent: agent_id.to_string(),
                capacity: agent.capacity,
            });
        }
        agent.current_calls += 1;
        if agent.current_calls >= agent.capacity {
            agent.status = AgentStatus::Busy;
        }
        debug!(agent = %agent_id, calls = agent.current_calls, "agent reserved");
        Ok(())
    }

    /// Atomically return one unit of an agent's capacity and stamp
    /// `last_call_at`.
    pub fn release(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<()> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .filter(|a| &a.tenant_id == tenant)
            .ok_or_else(|| DirectoryError::not_found("agent", agent_id.to_string()))?;

        if agent.current_calls == 0 {
            warn!(agent = %agent_id, "release with no active calls");
            return Err(DirectoryError::InvalidTransition {
                agent: agent_id.to_string(),
                detail: "release with current_calls == 0".to_string(),
            });
        }
        agent.current_calls -= 1;
        agent.last_call_at = Some(Utc::now());
        if agent.status == AgentStatus::Busy && agent.current_calls < agent.capacity {
            agent.status = AgentStatus::Available;
        }
        debug!(agent = %agent_id, calls = agent.current_calls, "agent released");
        Ok(())
    }

    /// Agents able to take a call right now: available, under capacity, on
    /// schedule, and covering the required skills.
    pub fn list_available(
        &self,
        tenant: &TenantId,
        department: Option<&DepartmentId>,
        required_skills: &[String],
    ) -> Vec<Agent> {
        self.list_available_at(tenant, department, required_skills, Utc::now())
    }

    /// Same as [`list_available`](Self::list_available) with an explicit
    /// clock, for schedule-sensitive tests.
    pub fn list_available_at(
        &self,
        tenant: &TenantId,
        department: Option<&DepartmentId>,
        required_skills: &[String],
        now: DateTime<Utc>,
    ) -> Vec<Agent> {
        let Some(members) = self.by_tenant.get(tenant) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for agent_id in members.iter() {
            let Some(agent) = self.agents.get(agent_id) else {
                continue;
            };
            if agent.status != AgentStatus::Available {
                continue;
            }
            if !agent.has_free_capacity() {
                continue;
            }
            if let Some(dept) = department {
                if agent.department_id.as_ref() != Some(dept) {
                    continue;
                }
            }
            if !agent.covers_skills(required_skills) {
                continue;
            }
            if !agent.work_schedule.is_business_time(now) {
                continue;
            }
            out.push(agent.clone());
        }
        out
    }

    /// All agents of a tenant, any status
    pub fn list_agents(&self, tenant: &TenantId) -> Vec<Agent> {
        let Some(members) = self.by_tenant.get(tenant) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| self.agents.get(id).map(|a| a.clone()))
            .collect()
    }

    /// Counts of available and busy agents for a tenant
    pub fn availability_counts(&self, tenant: &TenantId) -> (usize, usize) {
        let agents = self.list_agents(tenant);
        let available = agents
            .iter()
            .filter(|a| a.status == AgentStatus::Available)
            .count();
        let busy = agents.iter().filter(|a| a.status == AgentStatus::Busy).count();
        (available, busy)
    }

    /// Total active calls across a tenant's agents
    pub fn active_call_count(&self, tenant: &TenantId) -> u32 {
        self.list_agents(tenant)
            .iter()
            .map(|a| a.current_calls)
            .sum()
    }

    /// Drop all agents of a tenant. Used by tenant hard-deletion.
    pub fn purge_tenant(&self, tenant: &TenantId) {
        if let Some((_, members)) = self.by_tenant.remove(tenant) {
            for agent_id in members {
                self.agents.remove(&agent_id);
            }
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, tenant: &str, extension: &str) -> Agent {
        let mut agent = Agent::new(
            AgentId::from(id),
            TenantId::from(tenant),
            format!("Agent {}", id),
            extension,
        );
        agent.status = AgentStatus::Available;
        agent
    }

    #[test]
    fn reserve_flips_to_busy_at_capacity() {
        let registry = AgentRegistry::new();
        let tenant = TenantId::from("tenant-a");
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();

        registry.reserve(&tenant, &AgentId::from("agent-1")).unwrap();
        let reserved = registry.get_agent(&tenant, &AgentId::from("agent-1")).unwrap();
        assert_eq!(reserved.current_calls, 1);
        assert_eq!(reserved.status, AgentStatus::Busy);
    }

    #[test]
    fn reserve_at_capacity_fails() {
        let registry = AgentRegistry::new();
        let tenant = TenantId::from("tenant-a");
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();
        registry.reserve(&tenant, &AgentId::from("agent-1")).unwrap();

        let err = registry.reserve(&tenant, &AgentId::from("agent-1")).unwrap_err();
        assert!(matches!(err, DirectoryError::AgentAtCapacity { .. }));
    }

    #[test]
    fn release_restores_availability() {
        let registry = AgentRegistry::new();
        let tenant = TenantId::from("tenant-a");
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();
        let id = AgentId::from("agent-1");
        registry.reserve(&tenant, &id).unwrap();
        registry.release(&tenant, &id).unwrap();

        let released = registry.get_agent(&tenant, &id).unwrap();
        assert_eq!(released.current_calls, 0);
        assert_eq!(released.status, AgentStatus::Available);
        assert!(released.last_call_at.is_some());
    }

    #[test]
    fn release_without_calls_is_invalid() {
        let registry = AgentRegistry::new();
        let tenant = TenantId::from("tenant-a");
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();
        let err = registry.release(&tenant, &AgentId::from("agent-1")).unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidTransition { .. }));
    }

    #[test]
    fn status_cannot_jump_between_available_and_busy() {
        let registry = AgentRegistry::new();
        let tenant = TenantId::from("tenant-a");
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();
        let err = registry
            .set_status(&tenant, &AgentId::from("agent-1"), AgentStatus::Busy)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidTransition { .. }));

        // Away and offline remain reachable directly
        registry
            .set_status(&tenant, &AgentId::from("agent-1"), AgentStatus::Away)
            .unwrap();
        registry
            .set_status(&tenant, &AgentId::from("agent-1"), AgentStatus::Offline)
            .unwrap();
    }

    #[test]
    fn extensions_are_unique_per_tenant() {
        let registry = AgentRegistry::new();
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();
        let err = registry
            .upsert_agent(agent("agent-2", "tenant-a", "1001"))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::ExtensionTaken { .. }));

        // Same extension is fine in another tenant
        registry.upsert_agent(agent("agent-3", "tenant-b", "1001")).unwrap();
    }

    #[test]
    fn listing_is_tenant_scoped() {
        let registry = AgentRegistry::new();
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();
        registry.upsert_agent(agent("agent-2", "tenant-b", "1002")).unwrap();

        let for_a = registry.list_available(&TenantId::from("tenant-a"), None, &[]);
        assert_eq!(for_a.len(), 1);
        assert!(for_a.iter().all(|a| a.tenant_id == TenantId::from("tenant-a")));
    }

    #[test]
    fn skill_filter_applies() {
        let registry = AgentRegistry::new();
        let mut skilled = agent("agent-1", "tenant-a", "1001");
        skilled.skills = vec!["billing".into()];
        registry.upsert_agent(skilled).unwrap();
        registry.upsert_agent(agent("agent-2", "tenant-a", "1002")).unwrap();

        let tenant = TenantId::from("tenant-a");
        let matches = registry.list_available(&tenant, None, &["billing".to_string()]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, AgentId::from("agent-1"));
    }

    #[test]
    fn cross_tenant_access_is_a_miss() {
        let registry = AgentRegistry::new();
        registry.upsert_agent(agent("agent-1", "tenant-a", "1001")).unwrap();
        let err = registry
            .get_agent(&TenantId::from("tenant-b"), &AgentId::from("agent-1"))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound { .. }));
    }
}
