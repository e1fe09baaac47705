//! Routing selection policy
//!
//! Selection is a pure function over a directory snapshot; the engine
//! wraps it with the reserve compare-and-set and a bounded retry for the
//! window where two calls pick the same agent.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use voicedesk_infra_common::{AgentId, DepartmentId, TenantId};

use crate::error::{DirectoryError, Result};
use crate::registry::AgentRegistry;
use crate::types::Agent;

/// How many times a selection is retried when `reserve` loses the race to
/// a concurrent routing decision.
const RESERVE_RETRIES: usize = 3;

/// What a call needs from its agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingCriteria {
    pub department: Option<DepartmentId>,
    pub required_skills: Vec<String>,
    pub required_languages: Vec<String>,
    /// Agents to skip, e.g. ones that already rejected this call
    #[serde(skip)]
    pub exclude: HashSet<AgentId>,
}

impl RoutingCriteria {
    pub fn for_department(department: DepartmentId) -> Self {
        RoutingCriteria {
            department: Some(department),
            ..Default::default()
        }
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.required_skills = skills;
        self
    }

    pub fn excluding(mut self, exclude: HashSet<AgentId>) -> Self {
        self.exclude = exclude;
        self
    }
}

/// Pick the best agent from a snapshot, or `None` when the snapshot has no
/// eligible candidate.
///
/// Candidates are scored by `(routing_weight, -current_calls,
/// -last_call_at)`: heavier weight wins, then lighter load, then longest
/// idle. Ties break on the smallest agent id so the policy is
/// deterministic across runs.
pub fn select_agent(snapshot: &[Agent], criteria: &RoutingCriteria) -> Option<AgentId> {
    let mut best: Option<&Agent> = None;
    for candidate in snapshot {
        if criteria.exclude.contains(&candidate.id) {
            continue;
        }
        if !candidate.covers_languages(&criteria.required_languages) {
            continue;
        }
        best = match best {
            None => Some(candidate),
            Some(current) => {
                if better(candidate, current) {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.map(|a| a.id.clone())
}

fn better(a: &Agent, b: &Agent) -> bool {
    let key_a = score_key(a);
    let key_b = score_key(b);
    if key_a != key_b {
        return key_a > key_b;
    }
    // Stable tie-break: smallest id wins
    a.id < b.id
}

fn score_key(agent: &Agent) -> (u32, i64, i64) {
    let idle_key = -agent
        .last_call_at
        .map(|t| t.timestamp())
        .unwrap_or(i64::MIN + 1);
    (agent.routing_weight, -(agent.current_calls as i64), idle_key)
}

/// Outcome of offering a call to one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferOutcome {
    Accepted,
    Rejected,
    TimedOut,
}

/// One recorded offer within a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAttempt {
    pub agent: AgentId,
    pub outcome: OfferOutcome,
    pub at: DateTime<Utc>,
}

/// Per-call transfer bookkeeping: `offered -> {accepted | rejected |
/// timed_out} -> next candidate`, bounded by the configured attempt limit.
#[derive(Debug, Clone)]
pub struct TransferTracker {
    limit: u32,
    attempts: Vec<TransferAttempt>,
}

impl TransferTracker {
    pub fn new(limit: u32) -> Self {
        TransferTracker {
            limit: limit.max(1),
            attempts: Vec::new(),
        }
    }

    /// Agents that already received an offer for this call
    pub fn tried(&self) -> HashSet<AgentId> {
        self.attempts.iter().map(|a| a.agent.clone()).collect()
    }

    pub fn record(&mut self, agent: AgentId, outcome: OfferOutcome) {
        self.attempts.push(TransferAttempt {
            agent,
            outcome,
            at: Utc::now(),
        });
    }

    pub fn accepted(&self) -> Option<&AgentId> {
        self.attempts
            .iter()
            .find(|a| a.outcome == OfferOutcome::Accepted)
            .map(|a| &a.agent)
    }

    pub fn exhausted(&self) -> bool {
        self.attempts.len() as u32 >= self.limit
    }

    pub fn attempts(&self) -> &[TransferAttempt] {
        &self.attempts
    }
}

/// Routing engine: snapshot selection plus the reserve compare-and-set.
pub struct RoutingEngine {
    registry: Arc<AgentRegistry>,
}

impl RoutingEngine {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        RoutingEngine { registry }
    }

    /// Select and reserve an agent for a call.
    ///
    /// Selection runs over a fresh snapshot on every try; `reserve` may
    /// still fail under concurrent routing, in which case the policy is
    /// retried up to three times before yielding
    /// [`DirectoryError::NoAgentAvailable`].
    pub fn route(&self, tenant: &TenantId, criteria: &RoutingCriteria) -> Result<AgentId> {
        let mut exclude = criteria.exclude.clone();
        for attempt in 0..RESERVE_RETRIES {
            let snapshot = self.registry.list_available(
                tenant,
                criteria.department.as_ref(),
                &criteria.required_skills,
            );
            let narrowed = RoutingCriteria {
                department: criteria.department.clone(),
                required_skills: criteria.required_skills.clone(),
                required_languages: criteria.required_languages.clone(),
                exclude: exclude.clone(),
            };
            let Some(chosen) = select_agent(&snapshot, &narrowed) else {
                debug!(tenant = %tenant, attempt, "no candidate in snapshot");
                return Err(DirectoryError::NoAgentAvailable);
            };
            match self.registry.reserve(tenant, &chosen) {
                Ok(()) => {
                    info!(tenant = %tenant, agent = %chosen, attempt, "agent routed");
                    return Ok(chosen);
                }
                Err(DirectoryError::AgentAtCapacity { .. }) => {
                    // Lost the race; drop this candidate and re-snapshot
                    exclude.insert(chosen);
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(DirectoryError::NoAgentAvailable)
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentStatus;

    fn agent(id: &str, weight: u32, current: u32, capacity: u32) -> Agent {
        let mut agent = Agent::new(
            AgentId::from(id),
            TenantId::from("tenant-a"),
            id.to_string(),
            format!("ext-{}", id),
        );
        agent.status = AgentStatus::Available;
        agent.routing_weight = weight;
        agent.current_calls = current;
        agent.capacity = capacity;
        agent
    }

    #[test]
    fn higher_weight_wins() {
        let snapshot = vec![agent("agent-1", 3, 0, 1), agent("agent-2", 1, 0, 1)];
        let chosen = select_agent(&snapshot, &RoutingCriteria::default()).unwrap();
        assert_eq!(chosen, AgentId::from("agent-1"));
    }

    #[test]
    fn lighter_load_breaks_weight_ties() {
        let snapshot = vec![agent("agent-1", 2, 2, 3), agent("agent-2", 2, 0, 3)];
        let chosen = select_agent(&snapshot, &RoutingCriteria::default()).unwrap();
        assert_eq!(chosen, AgentId::from("agent-2"));
    }

    #[test]
    fn longest_idle_breaks_load_ties() {
        let mut early = agent("agent-1", 1, 0, 1);
        early.last_call_at = Some(Utc::now() - chrono::Duration::hours(2));
        let mut late = agent("agent-2", 1, 0, 1);
        late.last_call_at = Some(Utc::now());
        let chosen = select_agent(&[late, early], &RoutingCriteria::default()).unwrap();
        assert_eq!(chosen, AgentId::from("agent-1"));
    }

    #[test]
    fn full_ties_break_on_smallest_id() {
        let snapshot = vec![agent("agent-b", 1, 0, 1), agent("agent-a", 1, 0, 1)];
        let chosen = select_agent(&snapshot, &RoutingCriteria::default()).unwrap();
        assert_eq!(chosen, AgentId::from("agent-a"));
    }

    #[test]
    fn excluded_agents_are_skipped() {
        let snapshot = vec![agent("agent-1", 3, 0, 1), agent("agent-2", 1, 0, 1)];
        let criteria = RoutingCriteria::default()
            .excluding([AgentId::from("agent-1")].into_iter().collect());
        let chosen = select_agent(&snapshot, &criteria).unwrap();
        assert_eq!(chosen, AgentId::from("agent-2"));
    }

    #[test]
    fn empty_snapshot_yields_none() {
        assert!(select_agent(&[], &RoutingCriteria::default()).is_none());
    }

    #[test]
    fn route_reserves_the_winner() {
        let registry = Arc::new(AgentRegistry::new());
        let tenant = TenantId::from("tenant-a");
        registry.upsert_agent(agent("agent-1", 3, 0, 1)).unwrap();
        registry.upsert_agent(agent("agent-2", 1, 0, 1)).unwrap();

        let engine = RoutingEngine::new(registry.clone());
        let chosen = engine.route(&tenant, &RoutingCriteria::default()).unwrap();
        assert_eq!(chosen, AgentId::from("agent-1"));

        let reserved = registry.get_agent(&tenant, &chosen).unwrap();
        assert_eq!(reserved.current_calls, 1);
        assert_eq!(reserved.status, AgentStatus::Busy);
    }

    #[test]
    fn route_with_no_agents_reports_unavailable() {
        let engine = RoutingEngine::new(Arc::new(AgentRegistry::new()));
        let err = engine
            .route(&TenantId::from("tenant-a"), &RoutingCriteria::default())
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NoAgentAvailable));
    }

    #[test]
    fn tracker_exhausts_after_limit() {
        let mut tracker = TransferTracker::new(2);
        tracker.record(AgentId::from("agent-1"), OfferOutcome::Rejected);
        assert!(!tracker.exhausted());
        tracker.record(AgentId::from("agent-2"), OfferOutcome::TimedOut);
        assert!(tracker.exhausted());
        assert!(tracker.accepted().is_none());
        assert_eq!(tracker.tried().len(), 2);
    }
}
