//! Background callback execution
//!
//! A single logical worker drains due callbacks every tick. Sharding by
//! tenant hash is safe because the store's compare-and-set claim keeps any
//! request from being attempted twice concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use voicedesk_directory_core::{RoutingCriteria, RoutingEngine};
use voicedesk_infra_common::{AgentId, SessionId};

use crate::store::{CallbackStore, DueQuery};
use crate::types::{AttemptOutcome, CallbackRequest};

/// Longest permitted tick; the due-work selector is only as fresh as this.
const MAX_TICK: Duration = Duration::from_secs(30);

/// Why an egress dispatch failed to start
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("egress session failed to start: {0}")]
    EgressFailed(String),
}

/// Result of one executed attempt, reported back by the dispatcher.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub outcome: AttemptOutcome,
    pub session: Option<SessionId>,
    pub issue_resolved: bool,
    pub notes: Option<String>,
}

/// Hand-off seam to the call engine: given a claimed request and a
/// reserved agent, run the egress call and report how it went.
#[async_trait]
pub trait CallbackDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        request: CallbackRequest,
        agent: AgentId,
    ) -> Result<AttemptReport, DispatchError>;
}

/// Periodic due-work executor.
pub struct CallbackWorker {
    store: Arc<CallbackStore>,
    routing: Arc<RoutingEngine>,
    dispatcher: Arc<dyn CallbackDispatcher>,
    tick: Duration,
    batch_limit: usize,
    running: Arc<RwLock<bool>>,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl CallbackWorker {
    pub fn new(
        store: Arc<CallbackStore>,
        routing: Arc<RoutingEngine>,
        dispatcher: Arc<dyn CallbackDispatcher>,
    ) -> Self {
        CallbackWorker {
            store,
            routing,
            dispatcher,
            tick: Duration::from_secs(15),
            batch_limit: 25,
            running: Arc::new(RwLock::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.min(MAX_TICK);
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Start the tick loop
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            debug!("callback worker already running");
            return;
        }
        *running = true;

        let store = self.store.clone();
        let routing = self.routing.clone();
        let dispatcher = self.dispatcher.clone();
        let batch_limit = self.batch_limit;
        let running_flag = self.running.clone();
        let tick = self.tick;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(tick);
            while *running_flag.read().await {
                ticker.tick().await;
                let executed =
                    run_tick(&store, &routing, dispatcher.as_ref(), batch_limit).await;
                if executed > 0 {
                    debug!(executed, "callback tick complete");
                }
            }
        });
        *self.handle.write().await = Some(handle);
        info!(tick_seconds = self.tick.as_secs(), "callback worker started");
    }

    /// Stop the tick loop
    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(handle) = self.handle.write().await.take() {
            handle.abort();
            info!("callback worker stopped");
        }
    }

    pub fn routing(&self) -> &Arc<RoutingEngine> {
        &self.routing
    }

    /// Run a single tick inline. Exposed so tests and forced drains skip
    /// the timer.
    pub async fn tick_once(&self) -> usize {
        run_tick(
            &self.store,
            &self.routing,
            self.dispatcher.as_ref(),
            self.batch_limit,
        )
        .await
    }
}

/// One scheduler pass: expire lapsed requests, pull due work, and execute
/// each item through reserve -> claim -> dispatch -> record.
async fn run_tick(
    store: &CallbackStore,
    routing: &RoutingEngine,
    dispatcher: &dyn CallbackDispatcher,
    batch_limit: usize,
) -> usize {
    let now = Utc::now();
    store.expire_lapsed(now);

    let due = store.due_requests(&DueQuery {
        now,
        limit: batch_limit,
        tenant: None,
    });

    let mut executed = 0;
    for request in due {
        let tenant = request.tenant_id.clone();
        let criteria = RoutingCriteria {
            department: request.department_id.clone(),
            ..Default::default()
        };

        // Reserve the agent first; an unroutable request just waits for
        // the next tick.
        let agent = match routing.route(&tenant, &criteria) {
            Ok(agent) => agent,
            Err(_) => {
                debug!(callback = %request.id, tenant = %tenant, "no agent for callback; deferred");
                continue;
            }
        };

        // Claim the request; losing the race means another worker has it.
        let Some(prior) = store.claim(&request.id, &agent) else {
            if let Err(e) = routing.registry().release(&tenant, &agent) {
                warn!(agent = %agent, error = %e, "failed to release agent after lost claim");
            }
            continue;
        };

        let report = match dispatcher.dispatch(request.clone(), agent.clone()).await {
            Ok(report) => report,
            Err(DispatchError::EgressFailed(reason)) => {
                warn!(callback = %request.id, %reason, "egress dispatch failed");
                AttemptReport {
                    outcome: AttemptOutcome::Failed,
                    session: None,
                    issue_resolved: false,
                    notes: Some(reason),
                }
            }
        };

        match store.record_attempt(
            &tenant,
            &request.id,
            Some(agent.clone()),
            report.outcome,
            report.session,
            report.issue_resolved,
            report.notes,
        ) {
            Ok(updated) => {
                executed += 1;
                debug!(callback = %request.id, status = updated.status.as_str(),
                       "callback attempt applied");
            }
            Err(e) => {
                warn!(callback = %request.id, error = %e, "failed to record attempt");
                store.release_claim(&request.id, prior);
            }
        }

        if let Err(e) = routing.registry().release(&tenant, &agent) {
            warn!(agent = %agent, error = %e, "failed to release agent after callback");
        }
    }
    executed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::CallbackSchedule;
    use crate::store::CallbackDraft;
    use crate::types::{CallbackStatus, CallbackType};
    use parking_lot::Mutex;
    use voicedesk_audit_core::CallerFingerprint;
    use voicedesk_directory_core::{Agent, AgentRegistry, AgentStatus};
    use voicedesk_infra_common::TenantId;

    struct ScriptedDispatcher {
        outcomes: Mutex<Vec<AttemptOutcome>>,
        dispatched: Mutex<Vec<CallbackRequest>>,
    }

    impl ScriptedDispatcher {
        fn new(outcomes: Vec<AttemptOutcome>) -> Self {
            ScriptedDispatcher {
                outcomes: Mutex::new(outcomes),
                dispatched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CallbackDispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            request: CallbackRequest,
            _agent: AgentId,
        ) -> Result<AttemptReport, DispatchError> {
            self.dispatched.lock().push(request);
            let outcome = self
                .outcomes
                .lock()
                .pop()
                .unwrap_or(AttemptOutcome::Connected);
            Ok(AttemptReport {
                outcome,
                session: Some(SessionId::new()),
                issue_resolved: outcome == AttemptOutcome::Connected,
                notes: None,
            })
        }
    }

    fn setup(outcomes: Vec<AttemptOutcome>) -> (Arc<CallbackStore>, CallbackWorker, TenantId) {
        let tenant = TenantId::from("tenant-a");
        let registry = Arc::new(AgentRegistry::new());
        let mut agent = Agent::new(
            AgentId::from("agent-1"),
            tenant.clone(),
            "Alice",
            "1001",
        );
        agent.status = AgentStatus::Available;
        registry.upsert_agent(agent).unwrap();

        let store = Arc::new(CallbackStore::new());
        let routing = Arc::new(RoutingEngine::new(registry));
        let dispatcher = Arc::new(ScriptedDispatcher::new(outcomes));
        let worker = CallbackWorker::new(store.clone(), routing, dispatcher);
        (store, worker, tenant)
    }

    fn pending_request(store: &CallbackStore, tenant: &TenantId) -> crate::types::CallbackRequest {
        let mut draft = CallbackDraft::new(CallerFingerprint("hash".into()));
        draft.callback_type = CallbackType::Support;
        store
            .create(tenant, draft, &CallbackSchedule::default())
            .unwrap()
    }

    #[tokio::test]
    async fn tick_executes_due_request_and_completes_it() {
        let (store, worker, tenant) = setup(vec![AttemptOutcome::Connected]);
        let request = pending_request(&store, &tenant);

        let executed = worker.tick_once().await;
        assert_eq!(executed, 1);
        let done = store.get(&tenant, &request.id).unwrap();
        assert_eq!(done.status, CallbackStatus::Completed);
        assert_eq!(done.attempts, 1);
    }

    #[tokio::test]
    async fn no_answer_requeues_with_backoff() {
        let (store, worker, tenant) = setup(vec![AttemptOutcome::NoAnswer]);
        let request = pending_request(&store, &tenant);

        worker.tick_once().await;
        let pending = store.get(&tenant, &request.id).unwrap();
        assert_eq!(pending.status, CallbackStatus::Pending);
        assert_eq!(pending.attempts, 1);
        assert!(pending.next_attempt_at.unwrap() > Utc::now());

        // Not due again until the backoff lapses
        let executed = worker.tick_once().await;
        assert_eq!(executed, 0);
    }

    #[tokio::test]
    async fn agent_capacity_is_returned_after_attempt() {
        let (store, worker, tenant) = setup(vec![AttemptOutcome::Connected]);
        pending_request(&store, &tenant);
        worker.tick_once().await;

        let agents = worker
            .routing()
            .registry()
            .list_available(&tenant, None, &[]);
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].current_calls, 0);
    }

    #[tokio::test]
    async fn without_agents_requests_are_deferred() {
        let tenant = TenantId::from("tenant-b");
        let registry = Arc::new(AgentRegistry::new());
        let store = Arc::new(CallbackStore::new());
        let routing = Arc::new(RoutingEngine::new(registry));
        let dispatcher = Arc::new(ScriptedDispatcher::new(vec![]));
        let worker = CallbackWorker::new(store.clone(), routing, dispatcher);

        let request = pending_request(&store, &tenant);
        let executed = worker.tick_once().await;
        assert_eq!(executed, 0);
        let unchanged = store.get(&tenant, &request.id).unwrap();
        assert_eq!(unchanged.status, CallbackStatus::Pending);
        assert_eq!(unchanged.attempts, 0);
    }
}
