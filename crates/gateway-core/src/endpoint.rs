//! Endpoint types and per-endpoint health state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voicedesk_infra_common::EndpointId;

/// Consecutive failures before a closed circuit opens
pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;

/// Seconds an open circuit waits before allowing a half-open trial
pub const CIRCUIT_OPEN_SECONDS: i64 = 60;

/// A member of the HA pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub id: EndpointId,
    pub name: String,
    pub url: String,
    pub region: String,
    /// Lower number = higher priority
    pub priority: u32,
    /// Relative share for weighted balancing
    pub weight: u32,
    pub health_check_path: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl ServiceEndpoint {
    pub fn new(id: EndpointId, name: impl Into<String>, url: impl Into<String>) -> Self {
        ServiceEndpoint {
            id,
            name: name.into(),
            url: url.into(),
            region: "default".to_string(),
            priority: 1,
            weight: 100,
            health_check_path: "/health".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Full URL of the health probe target
    pub fn health_url(&self) -> String {
        format!(
            "{}{}",
            self.url.trim_end_matches('/'),
            self.health_check_path
        )
    }
}

/// Observed health of an endpoint
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Circuit-breaker gate for outbound calls
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of one endpoint, as exposed to callers and the
/// admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub endpoint: ServiceEndpoint,
    pub status: EndpointStatus,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Whether the half-open circuit's single trial request is in flight
    pub trial_in_flight: bool,
    pub outstanding_requests: u32,
    pub total_requests: u64,
}

impl EndpointSnapshot {
    /// Eligible endpoints accept traffic: not unhealthy/unknown, not
    /// circuit-open, and not a half-open endpoint whose one trial slot is
    /// already taken.
    pub fn is_eligible(&self) -> bool {
        if !matches!(
            self.status,
            EndpointStatus::Healthy | EndpointStatus::Degraded
        ) {
            return false;
        }
        match self.circuit {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !self.trial_in_flight,
        }
    }
}

/// Record of an active-endpoint change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub id: String,
    pub at: DateTime<Utc>,
    pub from_endpoint: Option<EndpointId>,
    pub to_endpoint: Option<EndpointId>,
    pub reason: String,
    pub success: bool,
    pub duration_ms: f64,
}
