//! The autoscaling controller
//!
//! Evaluation is a pure decision over the current telemetry sample and the
//! applicable policy; execution fans out to registered callbacks and
//! records an event either way. Cooldowns are directional and independent,
//! and a failed execution still arms its direction's cooldown so a broken
//! substrate does not get hammered.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info};
use voicedesk_infra_common::TenantId;

use crate::error::Result;
use crate::policy::ScalingPolicy;
use crate::telemetry::CapacitySource;

/// Bounded event history length
const EVENT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
    Maintain,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub action: ScalingAction,
    pub current_instances: u32,
    pub target_instances: u32,
    pub reason: String,
    /// 0-1, how firmly the telemetry supports the action
    pub confidence: f64,
}

impl Recommendation {
    fn maintain(current: u32, reason: impl Into<String>, confidence: f64) -> Self {
        Recommendation {
            action: ScalingAction::Maintain,
            current_instances: current,
            target_instances: current,
            reason: reason.into(),
            confidence,
        }
    }
}

/// Record of one executed (or attempted) scaling action
#[derive(Debug, Clone, Serialize)]
pub struct ScalingEvent {
    pub id: String,
    pub at: DateTime<Utc>,
    pub action: ScalingAction,
    pub from_instances: u32,
    pub to_instances: u32,
    pub reason: String,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Callback that effects an instance-count change in the orchestration
/// substrate. The substrate is external; the controller only knows
/// "from N to M".
#[async_trait]
pub trait ScalingExecutor: Send + Sync {
    async fn apply(
        &self,
        action: ScalingAction,
        from_instances: u32,
        to_instances: u32,
    ) -> std::result::Result<(), String>;
}

struct ScalerState {
    current_instances: u32,
    last_scale_up: Option<DateTime<Utc>>,
    last_scale_down: Option<DateTime<Utc>>,
    events: Vec<ScalingEvent>,
}

/// Closed-loop autoscaling controller.
pub struct AutoScaler {
    source: Arc<dyn CapacitySource>,
    executors: Mutex<Vec<Arc<dyn ScalingExecutor>>>,
    default_policy: Mutex<ScalingPolicy>,
    tenant_policies: DashMap<TenantId, ScalingPolicy>,
    state: Mutex<ScalerState>,
    running: Arc<RwLock<bool>>,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl AutoScaler {
    pub fn new(
        source: Arc<dyn CapacitySource>,
        policy: ScalingPolicy,
        initial_instances: u32,
    ) -> Result<Arc<Self>> {
        policy.validate()?;
        let current = initial_instances.clamp(policy.min_instances, policy.max_instances);
        Ok(Arc::new(AutoScaler {
            source,
            executors: Mutex::new(Vec::new()),
            default_policy: Mutex::new(policy),
            tenant_policies: DashMap::new(),
            state: Mutex::new(ScalerState {
                current_instances: current,
                last_scale_up: None,
                last_scale_down: None,
                events: Vec::new(),
            }),
            running: Arc::new(RwLock::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }))
    }

    /// Register a callback that effects scaling changes
    pub fn add_executor(&self, executor: Arc<dyn ScalingExecutor>) {
        self.executors.lock().push(executor);
    }

    /// Install a policy for a tenant, or the default when `tenant` is
    /// `None`.
    pub fn set_policy(&self, policy: ScalingPolicy, tenant: Option<&TenantId>) -> Result<()> {
        policy.validate()?;
        match tenant {
            Some(tenant) => {
                self.tenant_policies.insert(tenant.clone(), policy);
            }
            None => {
                *self.default_policy.lock() = policy;
            }
        }
        Ok(())
    }

    pub fn policy_for(&self, tenant: Option<&TenantId>) -> ScalingPolicy {
        tenant
            .and_then(|t| self.tenant_policies.get(t).map(|p| p.clone()))
            .unwrap_or_else(|| self.default_policy.lock().clone())
    }

    pub fn current_instances(&self) -> u32 {
        self.state.lock().current_instances
    }

    /// Bounded history of scaling events, newest last
    pub fn history(&self) -> Vec<ScalingEvent> {
        self.state.lock().events.clone()
    }

    /// Evaluate whether a scaling action is warranted right now.
    pub async fn evaluate(&self, tenant: Option<&TenantId>) -> Recommendation {
        let policy = self.policy_for(tenant);
        let signal = self.source.sample(tenant).await;
        let utilization = signal.utilization();
        self.decide(&policy, utilization, Utc::now())
    }

    /// Pure decision over a utilization sample. Split out so tests drive
    /// it with explicit clocks.
    fn decide(&self, policy: &ScalingPolicy, utilization: f64, now: DateTime<Utc>) -> Recommendation {
        let state = self.state.lock();
        let current = state.current_instances;

        if !policy.enabled {
            return Recommendation::maintain(current, "auto-scaling disabled", 1.0);
        }

        if utilization >= policy.scale_up_threshold {
            if let Some(last) = state.last_scale_up {
                if now < last + Duration::seconds(policy.scale_up_cooldown_seconds) {
                    return Recommendation::maintain(current, "scale-up cooldown active", 1.0);
                }
            }
            let target = (current + policy.scale_up_increment).min(policy.max_instances);
            if target > current {
                let confidence = (utilization / policy.scale_up_threshold).clamp(0.0, 1.0);
                return Recommendation {
                    action: ScalingAction::ScaleUp,
                    current_instances: current,
                    target_instances: target,
                    reason: format!(
                        "high utilization: {:.1}% >= {:.1}%",
                        utilization * 100.0,
                        policy.scale_up_threshold * 100.0
                    ),
                    confidence,
                };
            }
            return Recommendation::maintain(current, "already at maximum instances", 1.0);
        }

        if utilization <= policy.scale_down_threshold {
            if let Some(last) = state.last_scale_down {
                if now < last + Duration::seconds(policy.scale_down_cooldown_seconds) {
                    return Recommendation::maintain(current, "scale-down cooldown active", 1.0);
                }
            }
            let target = current
                .saturating_sub(policy.scale_down_decrement)
                .max(policy.min_instances);
            if target < current {
                let confidence = ((policy.scale_down_threshold - utilization)
                    / policy.scale_down_threshold)
                    .clamp(0.0, 1.0);
                return Recommendation {
                    action: ScalingAction::ScaleDown,
                    current_instances: current,
                    target_instances: target,
                    reason: format!(
                        "low utilization: {:.1}% <= {:.1}%",
                        utilization * 100.0,
                        policy.scale_down_threshold * 100.0
                    ),
                    confidence,
                };
            }
            return Recommendation::maintain(current, "already at minimum instances", 1.0);
        }

        Recommendation::maintain(
            current,
            format!("utilization within target range: {:.1}%", utilization * 100.0),
            0.8,
        )
    }

    /// Execute a recommendation through the registered callbacks.
    ///
    /// `maintain` records nothing but a success event and leaves cooldowns
    /// untouched. A failed callback records a failed event and still arms
    /// the direction's cooldown.
    pub async fn execute(&self, recommendation: &Recommendation) -> ScalingEvent {
        let now = Utc::now();
        if recommendation.action == ScalingAction::Maintain {
            let event = ScalingEvent {
                id: uuid::Uuid::new_v4().to_string(),
                at: now,
                action: ScalingAction::Maintain,
                from_instances: recommendation.current_instances,
                to_instances: recommendation.current_instances,
                reason: recommendation.reason.clone(),
                success: true,
                error_message: None,
            };
            self.push_event(event.clone());
            return event;
        }

        info!(action = ?recommendation.action,
              from = recommendation.current_instances,
              to = recommendation.target_instances,
              reason = %recommendation.reason,
              "executing scaling action");

        let executors: Vec<Arc<dyn ScalingExecutor>> = self.executors.lock().clone();
        let mut failure: Option<String> = None;
        for executor in executors {
            if let Err(e) = executor
                .apply(
                    recommendation.action,
                    recommendation.current_instances,
                    recommendation.target_instances,
                )
                .await
            {
                failure = Some(e);
                break;
            }
        }

        let success = failure.is_none();
        {
            let mut state = self.state.lock();
            if success {
                state.current_instances = recommendation.target_instances;
            }
            // Cooldown arms on failure too: no storm retries against a
            // broken substrate.
            match recommendation.action {
                ScalingAction::ScaleUp => state.last_scale_up = Some(now),
                ScalingAction::ScaleDown => state.last_scale_down = Some(now),
                ScalingAction::Maintain => {}
            }
        }

        if let Some(ref e) = failure {
            error!(error = %e, "scaling execution failed");
        }

        let event = ScalingEvent {
            id: uuid::Uuid::new_v4().to_string(),
            at: now,
            action: recommendation.action,
            from_instances: recommendation.current_instances,
            to_instances: if success {
                recommendation.target_instances
            } else {
                recommendation.current_instances
            },
            reason: recommendation.reason.clone(),
            success,
            error_message: failure,
        };
        self.push_event(event.clone());
        event
    }

    /// Evaluate and, when warranted, execute. The loop body and the
    /// forced entrypoint both come through here.
    pub async fn evaluate_and_execute(&self, tenant: Option<&TenantId>) -> ScalingEvent {
        let recommendation = self.evaluate(tenant).await;
        debug!(action = ?recommendation.action, reason = %recommendation.reason,
               confidence = recommendation.confidence, "scaling evaluation");
        self.execute(&recommendation).await
    }

    /// Re-run the decision immediately, ignoring the evaluation period but
    /// not cooldowns.
    pub async fn force_evaluation(&self, tenant: Option<&TenantId>) -> ScalingEvent {
        self.evaluate_and_execute(tenant).await
    }

    /// Start the periodic evaluation loop
    pub async fn start(self: Arc<Self>) {
        let mut running = self.running.write().await;
        if *running {
            debug!("autoscaler already running");
            return;
        }
        *running = true;

        let scaler = self.clone();
        let running_flag = self.running.clone();
        let period = {
            let policy = self.default_policy.lock();
            std::time::Duration::from_secs(policy.evaluation_period_seconds.max(1))
        };

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            while *running_flag.read().await {
                ticker.tick().await;
                scaler.evaluate_and_execute(None).await;
            }
        });
        *self.handle.write().await = Some(handle);
        info!(period_seconds = period.as_secs(), "autoscaler started");
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(handle) = self.handle.write().await.take() {
            handle.abort();
            info!("autoscaler stopped");
        }
    }

    fn push_event(&self, event: ScalingEvent) {
        let mut state = self.state.lock();
        state.events.push(event);
        let overflow = state.events.len().saturating_sub(EVENT_HISTORY_LIMIT);
        if overflow > 0 {
            state.events.drain(0..overflow);
        }
    }
}
