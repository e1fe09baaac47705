//! Endpoint health checking
//!
//! A background task probes every endpoint's health path on an interval,
//! classifies the result, and feeds the gateway's circuit breakers. The
//! probe itself is a trait so tests script results instead of listening
//! sockets.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointStatus, ServiceEndpoint};
use crate::gateway::HaGateway;

/// Default probe interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Raw result of probing one endpoint
#[derive(Debug, Clone)]
pub enum ProbeResult {
    /// HTTP status plus whether the body flagged partial health
    Responded { status: u16, degraded_body: bool },
    TimedOut,
    Error(String),
}

impl ProbeResult {
    /// Classification rules: 2xx healthy (degraded when the body says
    /// so), [300, 500) degraded, 5xx unhealthy, timeout/error unhealthy.
    pub fn classify(&self) -> EndpointStatus {
        match self {
            ProbeResult::Responded {
                status,
                degraded_body,
            } => {
                if (200..300).contains(status) {
                    if *degraded_body {
                        EndpointStatus::Degraded
                    } else {
                        EndpointStatus::Healthy
                    }
                } else if (300..500).contains(status) {
                    EndpointStatus::Degraded
                } else {
                    EndpointStatus::Unhealthy
                }
            }
            ProbeResult::TimedOut | ProbeResult::Error(_) => EndpointStatus::Unhealthy,
        }
    }
}

/// Capability trait for probing an endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &ServiceEndpoint) -> ProbeResult;
}

/// Real HTTP prober over reqwest
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        HttpHealthProbe {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, endpoint: &ServiceEndpoint) -> ProbeResult {
        let request = self
            .client
            .get(endpoint.health_url())
            .timeout(std::time::Duration::from_secs(endpoint.timeout_seconds));
        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let degraded_body = match response.json::<serde_json::Value>().await {
                    Ok(body) => body
                        .get("status")
                        .and_then(|s| s.as_str())
                        .map(|s| s.eq_ignore_ascii_case("degraded"))
                        .unwrap_or(false),
                    Err(_) => false,
                };
                ProbeResult::Responded {
                    status,
                    degraded_body,
                }
            }
            Err(e) if e.is_timeout() => ProbeResult::TimedOut,
            Err(e) => ProbeResult::Error(e.to_string()),
        }
    }
}

/// Background health-check loop over a gateway pool.
pub struct HealthChecker {
    gateway: Arc<HaGateway>,
    probe: Arc<dyn HealthProbe>,
    check_interval: Duration,
    running: Arc<RwLock<bool>>,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl HealthChecker {
    pub fn new(gateway: Arc<HaGateway>, probe: Arc<dyn HealthProbe>) -> Self {
        HealthChecker {
            gateway,
            probe,
            check_interval: DEFAULT_CHECK_INTERVAL,
            running: Arc::new(RwLock::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            debug!("health checker already running");
            return;
        }
        *running = true;

        let gateway = self.gateway.clone();
        let probe = self.probe.clone();
        let running_flag = self.running.clone();
        let check_interval = self.check_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            while *running_flag.read().await {
                ticker.tick().await;
                run_checks(&gateway, probe.as_ref()).await;
            }
        });
        *self.handle.write().await = Some(handle);
        info!(interval_seconds = self.check_interval.as_secs(), "health checker started");
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(handle) = self.handle.write().await.take() {
            handle.abort();
            info!("health checker stopped");
        }
    }

    /// Probe every endpoint once, inline. Exposed for tests and for the
    /// admin surface's forced refresh.
    pub async fn check_once(&self) {
        run_checks(&self.gateway, self.probe.as_ref()).await;
    }
}

async fn run_checks(gateway: &HaGateway, probe: &dyn HealthProbe) {
    // Lapsed open circuits get their half-open trial before probing
    gateway.advance_circuits(Utc::now());

    let snapshots = gateway.snapshots();
    let probes = snapshots.iter().map(|snapshot| {
        let endpoint = snapshot.endpoint.clone();
        async move {
            let result = probe.probe(&endpoint).await;
            (endpoint.id, result)
        }
    });

    for (id, result) in join_all(probes).await {
        let status = result.classify();
        if status == EndpointStatus::Unhealthy {
            warn!(endpoint = %id, ?result, "endpoint unhealthy");
        }
        gateway.apply_health(&id, status);
    }
}
