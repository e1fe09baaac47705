//! Callback request store
//!
//! Tenant-scoped store with the compare-and-set claim that keeps at most
//! one attempt per request in flight, the due-work selector the worker
//! drains, and the outcome application rules.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use voicedesk_audit_core::CallerFingerprint;
use voicedesk_infra_common::{AgentId, AttemptId, CallbackId, DepartmentId, SessionId, TenantId};

use crate::error::{CallbackError, Result};
use crate::schedule::CallbackSchedule;
use crate::types::{
    backoff_delay, AttemptOutcome, CallbackAttempt, CallbackPriority, CallbackRequest,
    CallbackStatus, CallbackType, DEFAULT_EXPIRY_DAYS,
};

/// Input to [`CallbackStore::create`]
#[derive(Debug, Clone)]
pub struct CallbackDraft {
    pub caller: CallerFingerprint,
    pub caller_name: Option<String>,
    pub caller_email: Option<String>,
    pub reason: Option<String>,
    pub callback_type: CallbackType,
    pub priority: CallbackPriority,
    pub requested_time: Option<DateTime<Utc>>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub timezone: String,
    pub department_id: Option<DepartmentId>,
    pub preferred_agent_id: Option<AgentId>,
    pub max_attempts: u32,
    pub tags: Vec<String>,
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl CallbackDraft {
    pub fn new(caller: CallerFingerprint) -> Self {
        CallbackDraft {
            caller,
            caller_name: None,
            caller_email: None,
            reason: None,
            callback_type: CallbackType::General,
            priority: CallbackPriority::Normal,
            requested_time: None,
            window_start: None,
            window_end: None,
            timezone: "UTC".to_string(),
            department_id: None,
            preferred_agent_id: None,
            max_attempts: 3,
            tags: Vec::new(),
            extras: serde_json::Map::new(),
        }
    }
}

/// Selector parameters for the due-work query
#[derive(Debug, Clone)]
pub struct DueQuery {
    pub now: DateTime<Utc>,
    /// Max requests returned per tick
    pub limit: usize,
    /// Restrict to one tenant; `None` scans all (single logical worker)
    pub tenant: Option<TenantId>,
}

pub struct CallbackStore {
    requests: DashMap<CallbackId, CallbackRequest>,
    attempts: DashMap<CallbackId, Vec<CallbackAttempt>>,
    by_tenant: DashMap<TenantId, Vec<CallbackId>>,
}

impl CallbackStore {
    pub fn new() -> Self {
        CallbackStore {
            requests: DashMap::new(),
            attempts: DashMap::new(),
            by_tenant: DashMap::new(),
        }
    }

    /// Create a callback request.
    ///
    /// Validates the time window and, when the caller stated a preference,
    /// maps it to the nearest schedulable slot; a mapped request starts
    /// `scheduled`, an unmapped one starts `pending`.
    pub fn create(
        &self,
        tenant: &TenantId,
        draft: CallbackDraft,
        schedule: &CallbackSchedule,
    ) -> Result<CallbackRequest> {
        let now = Utc::now();
        let window_end = draft
            .window_end
            .unwrap_or_else(|| now + Duration::days(DEFAULT_EXPIRY_DAYS));
        if let Some(start) = draft.window_start {
            if start >= window_end {
                return Err(CallbackError::InvalidWindow {
                    detail: format!("window start {} is not before end {}", start, window_end),
                });
            }
        }
        if window_end <= now {
            return Err(CallbackError::InvalidWindow {
                detail: "window ends in the past".to_string(),
            });
        }
        if draft.max_attempts == 0 {
            return Err(CallbackError::InvalidWindow {
                detail: "max_attempts must be >= 1".to_string(),
            });
        }

        let (scheduled_time, status) = match draft.requested_time {
            Some(requested) => match schedule.next_available_slot(requested.max(now)) {
                Some(slot) if slot <= window_end => (Some(slot), CallbackStatus::Scheduled),
                _ => (None, CallbackStatus::Pending),
            },
            None => (None, CallbackStatus::Pending),
        };

        let request = CallbackRequest {
            id: CallbackId::new(),
            tenant_id: tenant.clone(),
            caller: draft.caller,
            caller_name: draft.caller_name,
            caller_email: draft.caller_email,
            reason: draft.reason,
            callback_type: draft.callback_type,
            priority: draft.priority,
            requested_time: draft.requested_time,
            scheduled_time,
            window_start: draft.window_start,
            window_end,
            timezone: draft.timezone,
            department_id: draft.department_id,
            preferred_agent_id: draft.preferred_agent_id,
            assigned_agent_id: None,
            status,
            attempts: 0,
            max_attempts: draft.max_attempts,
            last_attempt_at: None,
            next_attempt_at: None,
            completed_at: None,
            outcome: None,
            follow_up_required: false,
            tags: draft.tags,
            extras: draft.extras,
            created_at: now,
        };

        info!(tenant = %tenant, callback = %request.id, status = request.status.as_str(),
              "callback request created");
        self.by_tenant
            .entry(tenant.clone())
            .or_default()
            .push(request.id.clone());
        self.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    /// Tenant-scoped lookup
    pub fn get(&self, tenant: &TenantId, id: &CallbackId) -> Result<CallbackRequest> {
        match self.requests.get(id) {
            Some(r) if &r.tenant_id == tenant => Ok(r.clone()),
            _ => Err(CallbackError::NotFound { id: id.to_string() }),
        }
    }

    /// All requests for a tenant, optionally filtered by status
    pub fn list(&self, tenant: &TenantId, status: Option<CallbackStatus>) -> Vec<CallbackRequest> {
        let Some(ids) = self.by_tenant.get(tenant) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.requests.get(id).map(|r| r.clone()))
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .collect()
    }

    /// Attempts recorded for a request, in sequence order
    pub fn attempts(&self, tenant: &TenantId, id: &CallbackId) -> Result<Vec<CallbackAttempt>> {
        self.get(tenant, id)?;
        Ok(self.attempts.get(id).map(|a| a.clone()).unwrap_or_default())
    }

    /// Pin a request to a specific time.
    ///
    /// Only `pending` and `scheduled` requests can move; the time must be
    /// in the future and inside the acceptable window.
    pub fn schedule(
        &self,
        tenant: &TenantId,
        id: &CallbackId,
        at: DateTime<Utc>,
    ) -> Result<CallbackRequest> {
        let now = Utc::now();
        let mut request = self
            .requests
            .get_mut(id)
            .filter(|r| &r.tenant_id == tenant)
            .ok_or_else(|| CallbackError::NotFound { id: id.to_string() })?;

        if !matches!(
            request.status,
            CallbackStatus::Pending | CallbackStatus::Scheduled
        ) {
            return Err(CallbackError::InvalidTransition {
                from: request.status.as_str(),
                to: CallbackStatus::Scheduled.as_str(),
            });
        }
        if at <= now {
            return Err(CallbackError::InvalidWindow {
                detail: "cannot schedule a callback in the past".to_string(),
            });
        }
        if let Some(start) = request.window_start {
            if at < start {
                return Err(CallbackError::InvalidWindow {
                    detail: "scheduled time is before the acceptable window".to_string(),
                });
            }
        }
        if at > request.window_end {
            return Err(CallbackError::InvalidWindow {
                detail: "scheduled time is after the acceptable window".to_string(),
            });
        }

        request.scheduled_time = Some(at);
        request.status = CallbackStatus::Scheduled;
        info!(tenant = %tenant, callback = %id, at = %at, "callback scheduled");
        Ok(request.clone())
    }

    /// Cancel iff the request is still `pending` or `scheduled`.
    ///
    /// An in-flight attempt refuses cancellation; terminal states are a
    /// no-op returning `false`.
    pub fn cancel(&self, tenant: &TenantId, id: &CallbackId, reason: &str) -> Result<bool> {
        let mut request = self
            .requests
            .get_mut(id)
            .filter(|r| &r.tenant_id == tenant)
            .ok_or_else(|| CallbackError::NotFound { id: id.to_string() })?;
        match request.status {
            CallbackStatus::Pending | CallbackStatus::Scheduled => {
                request.status = CallbackStatus::Cancelled;
                info!(tenant = %tenant, callback = %id, reason, "callback cancelled");
                Ok(true)
            }
            CallbackStatus::InProgress => Err(CallbackError::AttemptInProgress {
                id: id.to_string(),
            }),
            _ => Ok(false),
        }
    }

    /// Expire every non-terminal request whose window has closed. Returns
    /// the expired ids.
    pub fn expire_lapsed(&self, now: DateTime<Utc>) -> Vec<CallbackId> {
        let mut expired = Vec::new();
        for mut entry in self.requests.iter_mut() {
            if !entry.status.is_terminal() && entry.is_expired(now) {
                entry.status = CallbackStatus::Expired;
                expired.push(entry.id.clone());
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "callback requests expired");
        }
        expired
    }

    /// Due requests ordered by priority score descending, then scheduled
    /// time ascending, truncated to the query limit.
    pub fn due_requests(&self, query: &DueQuery) -> Vec<CallbackRequest> {
        let mut due: Vec<CallbackRequest> = self
            .requests
            .iter()
            .filter(|r| {
                query
                    .tenant
                    .as_ref()
                    .map(|t| &r.tenant_id == t)
                    .unwrap_or(true)
            })
            .filter(|r| r.is_due(query.now) && !r.is_expired(query.now))
            .map(|r| r.clone())
            .collect();
        due.sort_by(|a, b| {
            b.priority_score(query.now)
                .cmp(&a.priority_score(query.now))
                .then_with(|| {
                    let a_time = a.scheduled_time.unwrap_or(a.created_at);
                    let b_time = b.scheduled_time.unwrap_or(b.created_at);
                    a_time.cmp(&b_time)
                })
        });
        due.truncate(query.limit);
        due
    }

    /// Compare-and-set claim: `pending|scheduled -> in_progress`.
    ///
    /// Only one worker can win this per request, which is what bounds the
    /// system to one running attempt per callback. Returns the status the
    /// request had before the claim so a failed dispatch can hand it back.
    pub fn claim(&self, id: &CallbackId, agent: &AgentId) -> Option<CallbackStatus> {
        let mut request = self.requests.get_mut(id)?;
        match request.status {
            CallbackStatus::Pending | CallbackStatus::Scheduled => {
                let prior = request.status;
                request.status = CallbackStatus::InProgress;
                request.assigned_agent_id = Some(agent.clone());
                debug!(callback = %id, agent = %agent, "callback claimed");
                Some(prior)
            }
            _ => None,
        }
    }

    /// Hand a claimed request back untouched after a dispatch failure.
    pub fn release_claim(&self, id: &CallbackId, prior: CallbackStatus) {
        if let Some(mut request) = self.requests.get_mut(id) {
            if request.status == CallbackStatus::InProgress {
                request.status = prior;
                request.assigned_agent_id = None;
            }
        }
    }

    /// Record a finished attempt and apply the outcome rules.
    ///
    /// - `connected` and resolved -> `completed`
    /// - `connected`, unresolved -> `pending` with `follow_up_required`
    /// - retryable outcomes -> `pending` with backoff, or `failed` once
    ///   attempts are exhausted
    /// - `invalid` -> `failed`
    /// - a lapsed window expires the request even mid-finalization
    pub fn record_attempt(
        &self,
        tenant: &TenantId,
        id: &CallbackId,
        agent: Option<AgentId>,
        outcome: AttemptOutcome,
        session: Option<SessionId>,
        issue_resolved: bool,
        notes: Option<String>,
    ) -> Result<CallbackRequest> {
        let now = Utc::now();
        let mut request = self
            .requests
            .get_mut(id)
            .filter(|r| &r.tenant_id == tenant)
            .ok_or_else(|| CallbackError::NotFound { id: id.to_string() })?;

        if request.status != CallbackStatus::InProgress {
            return Err(CallbackError::NotClaimed {
                id: id.to_string(),
                status: request.status.as_str(),
            });
        }
        if request.attempts >= request.max_attempts {
            return Err(CallbackError::AttemptsExhausted {
                id: id.to_string(),
                max_attempts: request.max_attempts,
            });
        }

        request.attempts += 1;
        request.last_attempt_at = Some(now);
        request.outcome = Some(outcome);

        let attempt = CallbackAttempt {
            id: AttemptId::new(),
            callback_id: id.clone(),
            tenant_id: tenant.clone(),
            sequence: request.attempts,
            attempted_at: now,
            agent_id: agent,
            outcome,
            session_id: session,
            notes,
        };
        self.attempts.entry(id.clone()).or_default().push(attempt);

        // Window close trumps every other outcome.
        if request.is_expired(now) {
            request.status = CallbackStatus::Expired;
            warn!(callback = %id, "attempt finalized after window close; request expired");
            return Ok(request.clone());
        }

        match outcome {
            AttemptOutcome::Connected if issue_resolved => {
                request.status = CallbackStatus::Completed;
                request.completed_at = Some(now);
                request.next_attempt_at = None;
            }
            AttemptOutcome::Connected => {
                request.status = CallbackStatus::Pending;
                request.follow_up_required = true;
                request.next_attempt_at = Some(now + backoff_delay(request.attempts));
            }
            AttemptOutcome::Invalid => {
                request.status = CallbackStatus::Failed;
                request.next_attempt_at = None;
            }
            AttemptOutcome::NoAnswer | AttemptOutcome::Busy | AttemptOutcome::Failed => {
                if request.attempts >= request.max_attempts {
                    request.status = CallbackStatus::Failed;
                    request.next_attempt_at = None;
                } else {
                    request.status = CallbackStatus::Pending;
                    request.next_attempt_at = Some(now + backoff_delay(request.attempts));
                }
            }
        }

        info!(tenant = %tenant, callback = %id, attempt = request.attempts,
              outcome = ?outcome, status = request.status.as_str(), "callback attempt recorded");
        Ok(request.clone())
    }

    /// Drop everything owned by a tenant. Used by tenant hard-deletion.
    pub fn purge_tenant(&self, tenant: &TenantId) {
        if let Some((_, ids)) = self.by_tenant.remove(tenant) {
            for id in ids {
                self.requests.remove(&id);
                self.attempts.remove(&id);
            }
        }
    }

    pub fn len(&self, tenant: &TenantId) -> usize {
        self.by_tenant.get(tenant).map(|v| v.len()).unwrap_or(0)
    }
}

impl Default for CallbackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn store() -> CallbackStore {
        CallbackStore::new()
    }

    fn draft() -> CallbackDraft {
        CallbackDraft::new(CallerFingerprint("hashed-caller".into()))
    }

    fn tenant() -> TenantId {
        TenantId::from("tenant-a")
    }

    #[test]
    fn create_without_preference_is_pending() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        assert_eq!(request.status, CallbackStatus::Pending);
        assert!(request.scheduled_time.is_none());
    }

    #[test]
    fn create_with_preference_is_scheduled_on_a_slot() {
        let store = store();
        let mut d = draft();
        d.requested_time = Some(Utc::now() + Duration::hours(1));
        let request = store
            .create(&tenant(), d, &CallbackSchedule {
                hours: voicedesk_infra_common::BusinessHours::always(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(request.status, CallbackStatus::Scheduled);
        let slot = request.scheduled_time.unwrap();
        assert_eq!(slot.minute() % 15, 0);
    }

    #[test]
    fn invalid_window_is_rejected() {
        let store = store();
        let mut d = draft();
        d.window_start = Some(Utc::now() + Duration::hours(2));
        d.window_end = Some(Utc::now() + Duration::hours(1));
        assert!(matches!(
            store.create(&tenant(), d, &CallbackSchedule::default()),
            Err(CallbackError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn retry_backoff_walks_the_table_then_fails() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        let id = request.id.clone();
        let agent = AgentId::from("agent-1");

        // First attempt: no answer -> pending, next in ~15m
        store.claim(&id, &agent).unwrap();
        let after_first = store
            .record_attempt(&tenant(), &id, Some(agent.clone()), AttemptOutcome::NoAnswer,
                            None, false, None)
            .unwrap();
        assert_eq!(after_first.attempts, 1);
        assert_eq!(after_first.status, CallbackStatus::Pending);
        let next = after_first.next_attempt_at.unwrap();
        let delta = next - Utc::now();
        assert!(delta > Duration::minutes(14) && delta <= Duration::minutes(15));

        // Second attempt: next in ~1h
        store.claim(&id, &agent).unwrap();
        let after_second = store
            .record_attempt(&tenant(), &id, Some(agent.clone()), AttemptOutcome::NoAnswer,
                            None, false, None)
            .unwrap();
        assert_eq!(after_second.attempts, 2);
        let delta = after_second.next_attempt_at.unwrap() - Utc::now();
        assert!(delta > Duration::minutes(59) && delta <= Duration::minutes(60));

        // Third attempt exhausts the budget
        store.claim(&id, &agent).unwrap();
        let after_third = store
            .record_attempt(&tenant(), &id, Some(agent), AttemptOutcome::NoAnswer,
                            None, false, None)
            .unwrap();
        assert_eq!(after_third.attempts, 3);
        assert_eq!(after_third.status, CallbackStatus::Failed);
        assert!(after_third.next_attempt_at.is_none());
    }

    #[test]
    fn connected_and_resolved_completes() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        let agent = AgentId::from("agent-1");
        store.claim(&request.id, &agent).unwrap();
        let done = store
            .record_attempt(&tenant(), &request.id, Some(agent), AttemptOutcome::Connected,
                            None, true, None)
            .unwrap();
        assert_eq!(done.status, CallbackStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn connected_unresolved_requeues_with_follow_up() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        let agent = AgentId::from("agent-1");
        store.claim(&request.id, &agent).unwrap();
        let pending = store
            .record_attempt(&tenant(), &request.id, Some(agent), AttemptOutcome::Connected,
                            None, false, None)
            .unwrap();
        assert_eq!(pending.status, CallbackStatus::Pending);
        assert!(pending.follow_up_required);
    }

    #[test]
    fn claim_is_exclusive() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        let agent = AgentId::from("agent-1");
        assert!(store.claim(&request.id, &agent).is_some());
        assert!(store.claim(&request.id, &agent).is_none());
    }

    #[test]
    fn explicit_scheduling_respects_the_window() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();

        let at = Utc::now() + Duration::hours(2);
        let scheduled = store.schedule(&tenant(), &request.id, at).unwrap();
        assert_eq!(scheduled.status, CallbackStatus::Scheduled);
        assert_eq!(scheduled.scheduled_time, Some(at));

        // Past and out-of-window times are refused
        assert!(matches!(
            store.schedule(&tenant(), &request.id, Utc::now() - Duration::hours(1)),
            Err(CallbackError::InvalidWindow { .. })
        ));
        assert!(matches!(
            store.schedule(&tenant(), &request.id, Utc::now() + Duration::days(30)),
            Err(CallbackError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn scheduling_a_claimed_request_is_refused() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        store.claim(&request.id, &AgentId::from("agent-1")).unwrap();
        assert!(matches!(
            store.schedule(&tenant(), &request.id, Utc::now() + Duration::hours(1)),
            Err(CallbackError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancel_refused_mid_attempt() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        store.claim(&request.id, &AgentId::from("agent-1")).unwrap();
        assert!(matches!(
            store.cancel(&tenant(), &request.id, "caller changed mind"),
            Err(CallbackError::AttemptInProgress { .. })
        ));
    }

    #[test]
    fn cancel_from_pending_succeeds_once() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        assert!(store.cancel(&tenant(), &request.id, "duplicate").unwrap());
        // Terminal now: a second cancel is a no-op
        assert!(!store.cancel(&tenant(), &request.id, "again").unwrap());
    }

    #[test]
    fn release_claim_restores_prior_status() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        let prior = store.claim(&request.id, &AgentId::from("agent-1")).unwrap();
        store.release_claim(&request.id, prior);
        let restored = store.get(&tenant(), &request.id).unwrap();
        assert_eq!(restored.status, CallbackStatus::Pending);
        assert!(restored.assigned_agent_id.is_none());
    }

    #[test]
    fn due_ordering_follows_priority_score() {
        let store = store();
        let schedule = CallbackSchedule::default();
        let mut low = draft();
        low.priority = CallbackPriority::Low;
        let mut vip = draft();
        vip.priority = CallbackPriority::Vip;
        let low_req = store.create(&tenant(), low, &schedule).unwrap();
        let vip_req = store.create(&tenant(), vip, &schedule).unwrap();

        let due = store.due_requests(&DueQuery {
            now: Utc::now(),
            limit: 10,
            tenant: Some(tenant()),
        });
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, vip_req.id);
        assert_eq!(due[1].id, low_req.id);
    }

    #[test]
    fn expiry_sweep_closes_lapsed_requests() {
        let store = store();
        let mut d = draft();
        d.window_end = Some(Utc::now() + Duration::seconds(1));
        let request = store.create(&tenant(), d, &CallbackSchedule::default()).unwrap();

        let expired = store.expire_lapsed(Utc::now() + Duration::hours(1));
        assert_eq!(expired, vec![request.id.clone()]);
        assert_eq!(
            store.get(&tenant(), &request.id).unwrap().status,
            CallbackStatus::Expired
        );
    }

    #[test]
    fn cross_tenant_lookup_misses() {
        let store = store();
        let request = store
            .create(&tenant(), draft(), &CallbackSchedule::default())
            .unwrap();
        assert!(matches!(
            store.get(&TenantId::from("tenant-b"), &request.id),
            Err(CallbackError::NotFound { .. })
        ));
    }
}
