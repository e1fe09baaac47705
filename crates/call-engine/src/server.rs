//! # VoiceDesk Server
//!
//! High-level lifecycle wrapper: builds the engine and its subsystem
//! stores, wires the background workers (callback scheduler, autoscaler,
//! gateway health checker), serves the admin API, and shuts everything
//! down in order.
//!
//! ## Examples
//!
//! ```no_run
//! use voicedesk_call_engine::server::VoiceDeskServerBuilder;
//! use voicedesk_infra_common::Settings;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut server = VoiceDeskServerBuilder::new()
//!     .with_settings(Settings::from_env())
//!     .build()?;
//!
//! server.start().await?;
//! // ... run until shutdown signal ...
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info};

use voicedesk_audit_core::AuditLog;
use voicedesk_callback_core::{CallbackStore, CallbackWorker};
use voicedesk_directory_core::{AgentRegistry, TenantDirectory};
use voicedesk_gateway_core::{BalancingPolicy, HaGateway, HealthChecker, HttpHealthProbe};
use voicedesk_infra_common::Settings;
use voicedesk_ledger_core::CreditLedger;
use voicedesk_scaling_core::{AutoScaler, ScalingPolicy};

use crate::ai::{AiProvider, GatewayAiProvider};
use crate::api::{self, ApiAuth, ApiContext, RateLimiter};
use crate::config::EngineConfig;
use crate::engine::{
    CalmHost, CarrierSink, EngineCallbackDispatcher, EngineCapacitySource, LoggingCarrier,
    VoiceDeskEngine,
};
use crate::error::{EngineError, Result};

/// Builder for [`VoiceDeskServer`]
pub struct VoiceDeskServerBuilder {
    config: EngineConfig,
    settings: Option<Settings>,
    scaling_policy: ScalingPolicy,
    balancing: BalancingPolicy,
    carrier: Option<Arc<dyn CarrierSink>>,
    ai: Option<Arc<dyn AiProvider>>,
}

impl VoiceDeskServerBuilder {
    pub fn new() -> Self {
        VoiceDeskServerBuilder {
            config: EngineConfig::default(),
            settings: None,
            scaling_policy: ScalingPolicy::default(),
            balancing: BalancingPolicy::default(),
            carrier: None,
            ai: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_scaling_policy(mut self, policy: ScalingPolicy) -> Self {
        self.scaling_policy = policy;
        self
    }

    pub fn with_balancing_policy(mut self, policy: BalancingPolicy) -> Self {
        self.balancing = policy;
        self
    }

    /// Substitute the carrier client (tests use a recording sink)
    pub fn with_carrier(mut self, carrier: Arc<dyn CarrierSink>) -> Self {
        self.carrier = Some(carrier);
        self
    }

    /// Substitute the AI provider (tests use a scripted provider)
    pub fn with_ai_provider(mut self, ai: Arc<dyn AiProvider>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn build(self) -> Result<VoiceDeskServer> {
        let settings = self.settings.unwrap_or_else(Settings::from_env);

        let tenants = Arc::new(TenantDirectory::new());
        let registry = Arc::new(AgentRegistry::new());
        let ledger = Arc::new(CreditLedger::new());
        let audit = Arc::new(AuditLog::new(settings.fingerprint_salt.as_bytes()));
        let callbacks = Arc::new(CallbackStore::new());
        let gateway = Arc::new(HaGateway::new(self.balancing));

        let carrier = self.carrier.unwrap_or_else(|| Arc::new(LoggingCarrier));
        let ai = self
            .ai
            .unwrap_or_else(|| Arc::new(GatewayAiProvider::new(gateway.clone())));

        let engine = VoiceDeskEngine::new(
            self.config.clone(),
            tenants,
            registry,
            ledger,
            audit,
            callbacks.clone(),
            gateway.clone(),
            ai,
            carrier,
            &settings.fingerprint_salt,
        );

        let capacity = Arc::new(EngineCapacitySource::new(engine.clone(), Arc::new(CalmHost)));
        let scaler = AutoScaler::new(capacity, self.scaling_policy, 1)?;

        let callback_worker = CallbackWorker::new(
            callbacks,
            engine.routing().clone(),
            Arc::new(EngineCallbackDispatcher::new(engine.clone())),
        );

        let health_checker =
            HealthChecker::new(gateway, Arc::new(HttpHealthProbe::new()));

        let auth = Arc::new(ApiAuth::new(settings.jwt_secret.clone()));
        let limiter = Arc::new(RateLimiter::new(&self.config.rate_limit));
        let api_ctx = Arc::new(ApiContext {
            engine: engine.clone(),
            scaler: scaler.clone(),
            auth: auth.clone(),
            limiter,
            carrier_token: settings.carrier_auth_token.clone(),
            media_stream_url: format!("wss://{}/media", self.config.general.domain),
        });

        Ok(VoiceDeskServer {
            settings,
            engine,
            scaler,
            callback_worker,
            health_checker,
            api_ctx,
            auth,
            http_task: RwLock::new(None),
        })
    }
}

impl Default for VoiceDeskServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled platform process.
pub struct VoiceDeskServer {
    settings: Settings,
    engine: Arc<VoiceDeskEngine>,
    scaler: Arc<AutoScaler>,
    callback_worker: CallbackWorker,
    health_checker: HealthChecker,
    api_ctx: Arc<ApiContext>,
    auth: Arc<ApiAuth>,
    http_task: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl VoiceDeskServer {
    /// Start background workers and the admin API listener.
    pub async fn start(&mut self) -> Result<()> {
        info!(bind = %self.settings.bind_addr, "starting voicedesk server");

        self.callback_worker.start().await;
        self.health_checker.start().await;
        self.scaler.clone().start().await;

        let router = api::router(self.api_ctx.clone());
        let listener = TcpListener::bind(&self.settings.bind_addr)
            .await
            .map_err(|e| EngineError::internal(format!("bind failed: {}", e)))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("admin API server exited: {}", e);
            }
        });
        *self.http_task.write().await = Some(handle);

        info!("voicedesk server started");
        Ok(())
    }

    /// Stop workers and the listener.
    pub async fn stop(&mut self) {
        self.callback_worker.stop().await;
        self.health_checker.stop().await;
        self.scaler.stop().await;
        if let Some(handle) = self.http_task.write().await.take() {
            handle.abort();
        }
        info!("voicedesk server stopped");
    }

    pub fn engine(&self) -> &Arc<VoiceDeskEngine> {
        &self.engine
    }

    pub fn scaler(&self) -> &Arc<AutoScaler> {
        &self.scaler
    }

    pub fn auth(&self) -> &Arc<ApiAuth> {
        &self.auth
    }

    pub fn api_context(&self) -> &Arc<ApiContext> {
        &self.api_ctx
    }
}
