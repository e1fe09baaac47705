//! The HA gateway pool
//!
//! Owns endpoint registration, circuit-breaker bookkeeping, selection,
//! active-endpoint failover, and the execute-with-failover request path.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use voicedesk_infra_common::EndpointId;

use crate::balancer::{pick, BalancingPolicy};
use crate::endpoint::{
    CircuitState, EndpointSnapshot, EndpointStatus, FailoverEvent, ServiceEndpoint,
    CIRCUIT_FAILURE_THRESHOLD, CIRCUIT_OPEN_SECONDS,
};
use crate::error::{GatewayError, Result};

/// Bounded failover history length
const FAILOVER_HISTORY_LIMIT: usize = 100;

struct EndpointState {
    endpoint: ServiceEndpoint,
    status: EndpointStatus,
    circuit: CircuitState,
    consecutive_failures: u32,
    next_attempt_at: Option<DateTime<Utc>>,
    /// Set while a half-open circuit's single trial request is out
    trial_in_flight: bool,
    outstanding_requests: u32,
    total_requests: u64,
}

impl EndpointState {
    fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            endpoint: self.endpoint.clone(),
            status: self.status,
            circuit: self.circuit,
            consecutive_failures: self.consecutive_failures,
            next_attempt_at: self.next_attempt_at,
            trial_in_flight: self.trial_in_flight,
            outstanding_requests: self.outstanding_requests,
            total_requests: self.total_requests,
        }
    }
}

/// Aggregate request statistics across the pool
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadBalancerStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub requests_per_endpoint: HashMap<String, u64>,
}

/// Health-checked pool of backend endpoints with weighted balancing,
/// circuit breakers, and automatic failover.
pub struct HaGateway {
    endpoints: RwLock<HashMap<EndpointId, EndpointState>>,
    /// Insertion order, for round-robin cycling
    order: RwLock<Vec<EndpointId>>,
    rr_cursor: AtomicUsize,
    policy: BalancingPolicy,
    active: RwLock<Option<EndpointId>>,
    failover_events: Mutex<Vec<FailoverEvent>>,
    stats: Mutex<LoadBalancerStats>,
}

impl HaGateway {
    pub fn new(policy: BalancingPolicy) -> Self {
        HaGateway {
            endpoints: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            rr_cursor: AtomicUsize::new(0),
            policy,
            active: RwLock::new(None),
            failover_events: Mutex::new(Vec::new()),
            stats: Mutex::new(LoadBalancerStats::default()),
        }
    }

    /// Register an endpoint. The highest-priority endpoint becomes active
    /// when none is set yet.
    pub fn add_endpoint(&self, endpoint: ServiceEndpoint) -> Result<()> {
        if endpoint.weight == 0 {
            return Err(GatewayError::Validation {
                detail: "weight must be >= 1".to_string(),
            });
        }
        let id = endpoint.id.clone();
        info!(endpoint = %id, url = %endpoint.url, priority = endpoint.priority,
              "endpoint added to pool");
        {
            let mut endpoints = self.endpoints.write();
            endpoints.insert(
                id.clone(),
                EndpointState {
                    endpoint,
                    status: EndpointStatus::Unknown,
                    circuit: CircuitState::Closed,
                    consecutive_failures: 0,
                    next_attempt_at: None,
                    trial_in_flight: false,
                    outstanding_requests: 0,
                    total_requests: 0,
                },
            );
        }
        {
            let mut order = self.order.write();
            if !order.contains(&id) {
                order.push(id.clone());
            }
        }
        self.stats
            .lock()
            .requests_per_endpoint
            .entry(id.to_string())
            .or_insert(0);
        self.refresh_active("endpoint_added");
        Ok(())
    }

    pub fn remove_endpoint(&self, id: &EndpointId) -> Result<()> {
        {
            let mut endpoints = self.endpoints.write();
            if endpoints.remove(id).is_none() {
                return Err(GatewayError::EndpointNotFound { id: id.to_string() });
            }
        }
        self.order.write().retain(|e| e != id);
        self.refresh_active("endpoint_removed");
        Ok(())
    }

    /// Snapshot of the whole pool
    pub fn snapshots(&self) -> Vec<EndpointSnapshot> {
        let endpoints = self.endpoints.read();
        let order = self.order.read();
        order
            .iter()
            .filter_map(|id| endpoints.get(id).map(|s| s.snapshot()))
            .collect()
    }

    pub fn snapshot(&self, id: &EndpointId) -> Result<EndpointSnapshot> {
        self.endpoints
            .read()
            .get(id)
            .map(|s| s.snapshot())
            .ok_or_else(|| GatewayError::EndpointNotFound { id: id.to_string() })
    }

    /// The default endpoint for callers that do not load-balance: the
    /// highest-priority eligible endpoint.
    pub fn active_endpoint(&self) -> Option<EndpointSnapshot> {
        let active = self.active.read().clone()?;
        self.endpoints.read().get(&active).map(|s| s.snapshot())
    }

    /// Select an endpoint for one request under the configured policy.
    ///
    /// Only eligible endpoints are considered. A half-open endpoint
    /// accepts exactly one trial request: selecting it claims the trial
    /// slot under the pool lock, and contenders that lose the claim race
    /// re-pick from the remaining candidates. With nothing eligible the
    /// whole pool is used so the system still tries, and a critical alert
    /// is emitted.
    pub fn select_endpoint(&self) -> Result<ServiceEndpoint> {
        let snapshots = self.snapshots();
        if snapshots.is_empty() {
            return Err(GatewayError::EmptyPool);
        }

        let mut passed_over: HashSet<EndpointId> = HashSet::new();
        loop {
            let eligible: Vec<&EndpointSnapshot> = snapshots
                .iter()
                .filter(|s| s.is_eligible() && !passed_over.contains(&s.endpoint.id))
                .collect();
            if eligible.is_empty() {
                break;
            }
            let cursor = self.rr_cursor.fetch_add(1, Ordering::Relaxed);
            let chosen = pick(self.policy, &eligible, cursor);
            if chosen.circuit == CircuitState::HalfOpen
                && !self.claim_trial(&chosen.endpoint.id)
            {
                // Another request took the single trial slot first
                passed_over.insert(chosen.endpoint.id.clone());
                continue;
            }
            return Ok(chosen.endpoint.clone());
        }

        error!("CRITICAL: no eligible endpoints; falling back to full pool");
        let pool: Vec<&EndpointSnapshot> = snapshots.iter().collect();
        let cursor = self.rr_cursor.fetch_add(1, Ordering::Relaxed);
        Ok(pick(self.policy, &pool, cursor).endpoint.clone())
    }

    /// Claim the single trial slot of a half-open endpoint.
    ///
    /// Re-checks the circuit under the pool lock: returns `false` only
    /// when the endpoint is still half-open and its slot is already
    /// taken; a circuit that moved on since the snapshot needs no claim.
    fn claim_trial(&self, id: &EndpointId) -> bool {
        let mut endpoints = self.endpoints.write();
        let Some(state) = endpoints.get_mut(id) else {
            return false;
        };
        if state.circuit != CircuitState::HalfOpen {
            return true;
        }
        if state.trial_in_flight {
            return false;
        }
        state.trial_in_flight = true;
        debug!(endpoint = %id, "half-open trial slot claimed");
        true
    }

    /// Run `operation` against the pool with failover.
    ///
    /// Tries up to `max_retries` distinct selections; every outcome feeds
    /// the circuit breaker. Exhaustion surfaces as
    /// [`GatewayError::UpstreamFailure`].
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        E: std::fmt::Display,
        F: FnMut(ServiceEndpoint) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let max_retries = {
            let endpoints = self.endpoints.read();
            endpoints
                .values()
                .map(|s| s.endpoint.max_retries)
                .max()
                .unwrap_or(3)
                .max(1)
        };

        let mut last_error = String::from("no endpoints tried");
        for attempt in 0..max_retries {
            let endpoint = self.select_endpoint()?;
            let id = endpoint.id.clone();
            self.record_request_start(&id);
            let started = std::time::Instant::now();
            match operation(endpoint).await {
                Ok(value) => {
                    self.record_request_success(&id, started.elapsed().as_secs_f64() * 1000.0);
                    return Ok(value);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(endpoint = %id, attempt, error = %last_error, "request failed; failing over");
                    self.record_request_failure(&id);
                }
            }
        }
        Err(GatewayError::UpstreamFailure {
            attempts: max_retries,
            last_error,
        })
    }

    /// Apply a health observation to an endpoint.
    pub fn apply_health(&self, id: &EndpointId, status: EndpointStatus) {
        {
            let mut endpoints = self.endpoints.write();
            let Some(state) = endpoints.get_mut(id) else {
                return;
            };
            state.status = status;
            match status {
                EndpointStatus::Healthy | EndpointStatus::Degraded => {
                    breaker_success(state);
                }
                EndpointStatus::Unhealthy => {
                    breaker_failure(state);
                }
                EndpointStatus::Unknown => {}
            }
        }
        self.refresh_active("health_change");
    }

    /// Advance open circuits whose wait has lapsed to half-open. Called by
    /// the health checker each tick.
    pub fn advance_circuits(&self, now: DateTime<Utc>) {
        let mut endpoints = self.endpoints.write();
        for state in endpoints.values_mut() {
            if state.circuit == CircuitState::Open {
                if let Some(next) = state.next_attempt_at {
                    if now >= next {
                        state.circuit = CircuitState::HalfOpen;
                        state.trial_in_flight = false;
                        debug!(endpoint = %state.endpoint.id, "circuit half-open");
                    }
                }
            }
        }
    }

    pub fn record_request_start(&self, id: &EndpointId) {
        let mut endpoints = self.endpoints.write();
        if let Some(state) = endpoints.get_mut(id) {
            state.outstanding_requests += 1;
            state.total_requests += 1;
        }
        let mut stats = self.stats.lock();
        stats.total_requests += 1;
        *stats
            .requests_per_endpoint
            .entry(id.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_request_success(&self, id: &EndpointId, response_time_ms: f64) {
        {
            let mut endpoints = self.endpoints.write();
            if let Some(state) = endpoints.get_mut(id) {
                state.outstanding_requests = state.outstanding_requests.saturating_sub(1);
                breaker_success(state);
            }
        }
        let mut stats = self.stats.lock();
        stats.successful_requests += 1;
        let completed = stats.successful_requests + stats.failed_requests;
        if completed > 0 {
            stats.average_response_time_ms = (stats.average_response_time_ms
                * (completed - 1) as f64
                + response_time_ms)
                / completed as f64;
            stats.error_rate = stats.failed_requests as f64 / completed as f64;
        }
    }

    pub fn record_request_failure(&self, id: &EndpointId) {
        {
            let mut endpoints = self.endpoints.write();
            if let Some(state) = endpoints.get_mut(id) {
                state.outstanding_requests = state.outstanding_requests.saturating_sub(1);
                breaker_failure(state);
            }
        }
        {
            let mut stats = self.stats.lock();
            stats.failed_requests += 1;
            let completed = stats.successful_requests + stats.failed_requests;
            stats.error_rate = stats.failed_requests as f64 / completed as f64;
        }
        self.refresh_active("request_failure");
    }

    pub fn stats(&self) -> LoadBalancerStats {
        self.stats.lock().clone()
    }

    /// Recorded failovers, newest last
    pub fn failover_history(&self) -> Vec<FailoverEvent> {
        self.failover_events.lock().clone()
    }

    /// Re-derive the active endpoint; record a failover event when it
    /// changes. At most one endpoint is active at any moment by
    /// construction: the winner replaces the previous holder atomically
    /// under the `active` write lock.
    fn refresh_active(&self, reason: &str) {
        let started = std::time::Instant::now();
        let best = {
            let endpoints = self.endpoints.read();
            let mut eligible: Vec<&EndpointState> = endpoints
                .values()
                .filter(|s| s.snapshot().is_eligible())
                .collect();
            eligible.sort_by_key(|s| (s.endpoint.priority, s.endpoint.id.clone()));
            eligible.first().map(|s| s.endpoint.id.clone())
        };

        let mut active = self.active.write();
        if *active == best {
            return;
        }
        let from = active.clone();
        *active = best.clone();
        drop(active);

        let success = best.is_some();
        info!(from = ?from, to = ?best, reason, "active endpoint changed");
        let mut events = self.failover_events.lock();
        events.push(FailoverEvent {
            id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now(),
            from_endpoint: from,
            to_endpoint: best,
            reason: reason.to_string(),
            success,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
        let overflow = events.len().saturating_sub(FAILOVER_HISTORY_LIMIT);
        if overflow > 0 {
            events.drain(0..overflow);
        }
    }
}

/// Circuit bookkeeping on success: reset the failure count and close a
/// half-open circuit. The trial slot frees with the outcome.
fn breaker_success(state: &mut EndpointState) {
    state.consecutive_failures = 0;
    state.trial_in_flight = false;
    if state.circuit == CircuitState::HalfOpen {
        state.circuit = CircuitState::Closed;
        state.next_attempt_at = None;
        debug!(endpoint = %state.endpoint.id, "circuit closed after trial success");
    }
}

/// Circuit bookkeeping on failure: count up and open at the threshold. A
/// failed half-open trial re-opens immediately and frees the trial slot.
fn breaker_failure(state: &mut EndpointState) {
    state.consecutive_failures += 1;
    state.trial_in_flight = false;
    match state.circuit {
        CircuitState::Closed => {
            if state.consecutive_failures >= CIRCUIT_FAILURE_THRESHOLD {
                state.circuit = CircuitState::Open;
                state.next_attempt_at = Some(Utc::now() + Duration::seconds(CIRCUIT_OPEN_SECONDS));
                warn!(endpoint = %state.endpoint.id, "circuit opened");
            }
        }
        CircuitState::HalfOpen => {
            state.circuit = CircuitState::Open;
            state.next_attempt_at = Some(Utc::now() + Duration::seconds(CIRCUIT_OPEN_SECONDS));
            warn!(endpoint = %state.endpoint.id, "half-open trial failed; circuit re-opened");
        }
        CircuitState::Open => {}
    }
}
