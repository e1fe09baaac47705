//! The VoiceDesk engine
//!
//! Central coordinator wiring the directory, routing, ledger, audit log,
//! callback store, HA gateway, and autoscaler behind the per-call session
//! tasks. Sessions emit commands over a channel; the engine's processor
//! turns them into carrier actions, AI turns, and routing work, and feeds
//! the results back into the owning session's mailbox.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use voicedesk_audit_core::{
    AuditEventType, AuditLog, CallerFingerprint, EventDraft, FingerprintHasher,
};
use voicedesk_callback_core::{
    AttemptOutcome, CallbackDraft, CallbackSchedule, CallbackStore, CallbackType,
};
use voicedesk_directory_core::{
    AgentRegistry, OfferOutcome, RoutingCriteria, RoutingEngine, TenantDirectory, TransferTracker,
};
use voicedesk_gateway_core::HaGateway;
use voicedesk_infra_common::{AgentId, CallId, DepartmentId, SessionId, TenantId};
use voicedesk_ledger_core::{BudgetDecision, CreditLedger};
use voicedesk_scaling_core::{CapacitySignal, CapacitySource};

use crate::ai::{AiInbound, AiProvider, TurnTracker};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::session::task::{spawn_session, SessionCommand, SessionHandle, SessionSnapshot};
use crate::session::types::{Command, SessionContext, SessionEvent, SessionState};
use crate::spam::{AllowAllClassifier, SpamClassifier, SpamVerdict};
use crate::translation::{TranslationProvider, TranslationService};
use crate::voicemail::VoicemailStore;

/// Outbound carrier actions. The carrier itself is external; this is the
/// seam its API client sits behind, and what tests record.
#[async_trait]
pub trait CarrierSink: Send + Sync {
    async fn play(&self, call: &CallId, text: &str);
    async fn bridge(&self, call: &CallId, agent_endpoint: &str);
    async fn record(&self, call: &CallId, box_id: &str);
    async fn hangup(&self, call: &CallId);
    /// Originate an egress leg for a callback; `dial_ref` is the opaque
    /// reference the carrier resolves to the caller
    async fn originate(&self, tenant: &TenantId, dial_ref: &str) -> bool;
}

/// Carrier sink that only logs; the default until a real carrier client
/// is wired in deployment.
pub struct LoggingCarrier;

#[async_trait]
impl CarrierSink for LoggingCarrier {
    async fn play(&self, call: &CallId, text: &str) {
        debug!(call = %call, chars = text.len(), "carrier.play");
    }
    async fn bridge(&self, call: &CallId, agent_endpoint: &str) {
        debug!(call = %call, endpoint = agent_endpoint, "carrier.bridge");
    }
    async fn record(&self, call: &CallId, box_id: &str) {
        debug!(call = %call, box_id, "carrier.record");
    }
    async fn hangup(&self, call: &CallId) {
        debug!(call = %call, "carrier.hangup");
    }
    async fn originate(&self, tenant: &TenantId, _dial_ref: &str) -> bool {
        debug!(tenant = %tenant, "carrier.originate");
        true
    }
}

struct ActiveSession {
    handle: SessionHandle,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    call_id: CallId,
    caller: CallerFingerprint,
    department: Option<DepartmentId>,
    /// Caller/assistant lines fed to the AI provider as context
    transcript: Mutex<Vec<String>>,
    turns: Mutex<TurnTracker>,
    /// Caller's language when it differs from the service language
    language: Mutex<Option<String>>,
    /// Tenant opted into live translation (feature flag)
    translation_enabled: bool,
}

struct PendingOffer {
    agent: AgentId,
    decision: Option<oneshot::Sender<OfferOutcome>>,
}

/// Aggregate engine statistics for supervisors and the admin surface
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub active_sessions: usize,
    pub bridged_sessions: usize,
    pub available_agents: usize,
    pub busy_agents: usize,
    pub pending_callbacks: usize,
}

/// Central orchestration engine. Construct with [`VoiceDeskEngine::new`]
/// and share via `Arc`.
pub struct VoiceDeskEngine {
    config: EngineConfig,
    tenants: Arc<TenantDirectory>,
    registry: Arc<AgentRegistry>,
    routing: Arc<RoutingEngine>,
    ledger: Arc<CreditLedger>,
    audit: Arc<AuditLog>,
    callbacks: Arc<CallbackStore>,
    gateway: Arc<HaGateway>,
    ai: Arc<dyn AiProvider>,
    carrier: Arc<dyn CarrierSink>,
    hasher: FingerprintHasher,
    voicemail: Arc<VoicemailStore>,
    translation: Arc<TranslationService>,
    spam: RwLock<Arc<dyn SpamClassifier>>,
    sessions: Arc<DashMap<SessionId, Arc<ActiveSession>>>,
    by_call: Arc<DashMap<CallId, SessionId>>,
    offers: Arc<DashMap<SessionId, PendingOffer>>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl VoiceDeskEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        tenants: Arc<TenantDirectory>,
        registry: Arc<AgentRegistry>,
        ledger: Arc<CreditLedger>,
        audit: Arc<AuditLog>,
        callbacks: Arc<CallbackStore>,
        gateway: Arc<HaGateway>,
        ai: Arc<dyn AiProvider>,
        carrier: Arc<dyn CarrierSink>,
        fingerprint_salt: &str,
    ) -> Arc<Self> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let routing = Arc::new(RoutingEngine::new(registry.clone()));
        let engine = Arc::new(VoiceDeskEngine {
            config,
            tenants,
            registry,
            routing,
            ledger,
            audit,
            callbacks,
            gateway,
            ai,
            carrier,
            hasher: FingerprintHasher::new(fingerprint_salt),
            voicemail: Arc::new(VoicemailStore::new()),
            translation: Arc::new(TranslationService::new()),
            spam: RwLock::new(Arc::new(AllowAllClassifier)),
            sessions: Arc::new(DashMap::new()),
            by_call: Arc::new(DashMap::new()),
            offers: Arc::new(DashMap::new()),
            commands_tx,
        });

        let processor = engine.clone();
        tokio::spawn(async move {
            processor.process_commands(commands_rx).await;
        });
        info!("voicedesk engine initialized");
        engine
    }

    // === Session lifecycle ===

    /// Admit and open a session for an inbound call.
    ///
    /// Refuses when the tenant is unknown or deactivated, out of minute
    /// budget, or at its concurrent-call gate. The raw caller number is
    /// fingerprinted immediately and not retained.
    pub fn open_session(
        &self,
        tenant_id: &TenantId,
        caller_raw_number: &str,
        carrier_call_id: CallId,
        department: Option<DepartmentId>,
    ) -> Result<SessionId> {
        let tenant = self.tenants.get_tenant(tenant_id)?;
        if !tenant.active {
            return Err(EngineError::TenantInactive {
                tenant: tenant_id.to_string(),
            });
        }
        match self.ledger.check_budget(tenant_id, 1) {
            BudgetDecision::Deny => {
                return Err(EngineError::QuotaExhausted {
                    tenant: tenant_id.to_string(),
                });
            }
            BudgetDecision::Warn => {
                let _ = self.audit.emit(
                    tenant_id,
                    EventDraft::new(AuditEventType::CreditWarning, "budget_near_limit")
                        .with_payload(serde_json::json!({
                            "remaining_seconds": self.ledger.remaining(tenant_id),
                        })),
                );
            }
            BudgetDecision::Ok => {}
        }
        let active = self.active_session_count(tenant_id) as u32;
        if active >= tenant.max_concurrent_calls {
            return Err(EngineError::CapacityExhausted {
                tenant: tenant_id.to_string(),
                active,
            });
        }
        // Aggregate gate across all tenants
        let total_active = self.total_active_sessions() as u32;
        if total_active >= self.config.general.max_concurrent_calls {
            warn!(total_active, "platform concurrency ceiling reached");
            return Err(EngineError::CapacityExhausted {
                tenant: tenant_id.to_string(),
                active: total_active,
            });
        }

        let caller = self.hasher.fingerprint(caller_raw_number);
        if self.spam.read().classify(tenant_id, &caller) == SpamVerdict::Block {
            let _ = self.audit.emit(
                tenant_id,
                EventDraft::new(AuditEventType::SecurityEvent, "spam_call_blocked")
                    .with_actor(caller.as_str()),
            );
            return Err(EngineError::SpamRejected {
                tenant: tenant_id.to_string(),
            });
        }
        let voicemail_box = department
            .as_ref()
            .and_then(|d| self.tenants.get_department(tenant_id, d).ok())
            .map(|d| d.voicemail_box)
            .unwrap_or_else(|| format!("vm-{}", tenant_id));

        let ctx = SessionContext {
            session_id: SessionId::new(),
            tenant_id: tenant_id.clone(),
            call_id: carrier_call_id.clone(),
            caller: caller.clone(),
            greeting_text: self.config.general.greeting_text.clone(),
            ai_fallback_text: self.config.general.ai_fallback_text.clone(),
            ai_attempts: 0,
            max_transfer_attempts: tenant.max_transfer_attempts,
            fallback: tenant.fallback,
            voicemail_box,
            department: department.clone(),
            assigned_agent: None,
            opened_at: Utc::now(),
        };
        let session_id = ctx.session_id.clone();

        let (handle, snapshot, mut closed_rx) = spawn_session(
            ctx,
            self.config.timeouts.clone(),
            self.ledger.clone(),
            self.audit.clone(),
            self.commands_tx.clone(),
        );

        let record = Arc::new(ActiveSession {
            handle,
            snapshot,
            call_id: carrier_call_id.clone(),
            caller,
            department,
            transcript: Mutex::new(Vec::new()),
            turns: Mutex::new(TurnTracker::new()),
            language: Mutex::new(None),
            translation_enabled: tenant.has_flag("translation"),
        });
        self.sessions.insert(session_id.clone(), record);
        self.by_call.insert(carrier_call_id, session_id.clone());

        let _ = self.audit.emit(
            tenant_id,
            EventDraft::new(AuditEventType::CallInitiated, "session_open")
                .with_session(session_id.as_str()),
        );

        // Reaper: drop the engine-side record once the task finishes
        let sessions = self.sessions.clone();
        let by_call = self.by_call.clone();
        let offers = self.offers.clone();
        tokio::spawn(async move {
            if let Some((finished, outcome)) = closed_rx.recv().await {
                debug!(session = %finished, outcome = outcome.as_str(), "session reaped");
                if let Some((_, record)) = sessions.remove(&finished) {
                    by_call.remove(&record.call_id);
                }
                offers.remove(&finished);
            }
        });

        info!(tenant = %tenant_id, session = %session_id, "session opened");
        Ok(session_id)
    }

    /// Idempotent termination; races safely with any other event.
    pub fn terminate(&self, session_id: &SessionId, reason: &str) {
        if let Some(record) = self.sessions.get(session_id) {
            record.handle.send(SessionEvent::CarrierError {
                detail: format!("terminated: {}", reason),
            });
        } else {
            warn!(session = %session_id, reason, "terminate for unknown or finished session");
        }
    }

    pub fn caller_utterance(&self, session_id: &SessionId, transcript: &str) -> Result<()> {
        let record = self.session(session_id)?;
        record
            .transcript
            .lock()
            .push(format!("caller: {}", transcript));
        record.handle.send(SessionEvent::CallerUtterance {
            transcript: transcript.to_string(),
        });
        Ok(())
    }

    pub fn request_transfer(
        &self,
        session_id: &SessionId,
        reason: &str,
        department: Option<DepartmentId>,
    ) -> Result<()> {
        let record = self.session(session_id)?;
        record.handle.send(SessionEvent::TransferRequested {
            reason: reason.to_string(),
            department,
        });
        Ok(())
    }

    /// Agent the session's call is currently offered to, if any
    pub fn pending_offer(&self, session_id: &SessionId) -> Option<AgentId> {
        self.offers.get(session_id).map(|o| o.agent.clone())
    }

    /// Agent-side answer to an outstanding offer
    pub fn agent_accept(&self, session_id: &SessionId, agent_id: &AgentId) -> Result<()> {
        self.resolve_offer(session_id, agent_id, OfferOutcome::Accepted)
    }

    pub fn agent_reject(&self, session_id: &SessionId, agent_id: &AgentId) -> Result<()> {
        self.resolve_offer(session_id, agent_id, OfferOutcome::Rejected)
    }

    pub fn caller_hangup(&self, session_id: &SessionId) -> Result<()> {
        let record = self.session(session_id)?;
        record.handle.send(SessionEvent::CallerHangup);
        Ok(())
    }

    pub fn agent_hangup(&self, session_id: &SessionId) -> Result<()> {
        let record = self.session(session_id)?;
        record.handle.send(SessionEvent::AgentHangup);
        Ok(())
    }

    pub fn carrier_error(&self, session_id: &SessionId, detail: &str) -> Result<()> {
        let record = self.session(session_id)?;
        record.handle.send(SessionEvent::CarrierError {
            detail: detail.to_string(),
        });
        Ok(())
    }

    /// Voicemail recording completed for a session's call
    pub fn recording_complete(&self, session_id: &SessionId) -> Result<()> {
        let record = self.session(session_id)?;
        self.voicemail
            .finish(&record.handle.tenant_id, session_id);
        record.handle.send(SessionEvent::RecordingComplete);
        Ok(())
    }

    /// Install the spam classifier chosen from configuration
    pub fn set_spam_classifier(&self, classifier: Arc<dyn SpamClassifier>) {
        *self.spam.write() = classifier;
    }

    /// Install the translation provider chosen from configuration
    pub fn set_translation_provider(&self, provider: Arc<dyn TranslationProvider>) {
        self.translation.set_provider(provider);
    }

    /// Declare the caller's language for a session. Takes effect from the
    /// next AI turn for tenants with the `translation` feature flag.
    pub fn set_session_language(&self, session_id: &SessionId, language: &str) -> Result<()> {
        if !self.translation.supports(language) {
            return Err(EngineError::validation(format!(
                "unsupported language: {}",
                language
            )));
        }
        let record = self.session(session_id)?;
        *record.language.lock() = Some(language.to_string());
        debug!(session = %session_id, language, "session language set");
        Ok(())
    }

    pub fn translation(&self) -> &Arc<TranslationService> {
        &self.translation
    }

    pub fn voicemail(&self) -> &Arc<VoicemailStore> {
        &self.voicemail
    }

    // === Observation ===

    pub fn session_state(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        self.sessions
            .get(session_id)
            .map(|r| r.snapshot.read().clone())
    }

    /// Live session snapshots for one tenant
    pub fn session_summaries(&self, tenant_id: &TenantId) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .filter(|e| &e.value().handle.tenant_id == tenant_id)
            .map(|e| e.value().snapshot.read().clone())
            .collect()
    }

    /// Fingerprint a raw caller number with the platform salt
    pub fn fingerprint(&self, raw_number: &str) -> CallerFingerprint {
        self.hasher.fingerprint(raw_number)
    }

    pub fn session_for_call(&self, call_id: &CallId) -> Option<SessionId> {
        self.by_call.get(call_id).map(|s| s.clone())
    }

    pub fn active_session_count(&self, tenant_id: &TenantId) -> usize {
        self.sessions
            .iter()
            .filter(|entry| &entry.value().handle.tenant_id == tenant_id)
            .count()
    }

    pub fn total_active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self, tenant_id: &TenantId) -> EngineStats {
        let bridged = self
            .sessions
            .iter()
            .filter(|e| {
                &e.value().handle.tenant_id == tenant_id
                    && e.value().snapshot.read().state == SessionState::Bridged
            })
            .count();
        let (available, busy) = self.registry.availability_counts(tenant_id);
        EngineStats {
            active_sessions: self.active_session_count(tenant_id),
            bridged_sessions: bridged,
            available_agents: available,
            busy_agents: busy,
            pending_callbacks: self.callbacks.len(tenant_id),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tenants(&self) -> &Arc<TenantDirectory> {
        &self.tenants
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<CreditLedger> {
        &self.ledger
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn callbacks(&self) -> &Arc<CallbackStore> {
        &self.callbacks
    }

    pub fn gateway(&self) -> &Arc<HaGateway> {
        &self.gateway
    }

    pub fn routing(&self) -> &Arc<RoutingEngine> {
        &self.routing
    }

    /// Hard-delete a tenant: directory removal cascades to every owned
    /// store. Active sessions run to completion per policy.
    pub fn remove_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        self.tenants.remove_tenant(tenant_id)?;
        self.registry.purge_tenant(tenant_id);
        self.callbacks.purge_tenant(tenant_id);
        self.ledger.purge_tenant(tenant_id);
        self.voicemail.purge_tenant(tenant_id);
        self.audit.purge_tenant(tenant_id);
        info!(tenant = %tenant_id, "tenant removed with cascade");
        Ok(())
    }

    // === Internals ===

    fn session(&self, session_id: &SessionId) -> Result<Arc<ActiveSession>> {
        self.sessions
            .get(session_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| EngineError::SessionNotFound {
                session: session_id.to_string(),
            })
    }

    fn resolve_offer(
        &self,
        session_id: &SessionId,
        agent_id: &AgentId,
        outcome: OfferOutcome,
    ) -> Result<()> {
        let mut entry =
            self.offers
                .get_mut(session_id)
                .ok_or_else(|| EngineError::SessionNotFound {
                    session: session_id.to_string(),
                })?;
        if &entry.agent != agent_id {
            return Err(EngineError::validation(format!(
                "offer for session {} belongs to {}",
                session_id, entry.agent
            )));
        }
        if let Some(tx) = entry.decision.take() {
            let _ = tx.send(outcome);
        }
        Ok(())
    }

    /// Command processor: executes every side effect sessions ask for.
    async fn process_commands(
        self: Arc<Self>,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        while let Some(SessionCommand {
            session,
            tenant,
            command,
        }) = commands.recv().await
        {
            // Releases must run even when the session record is already
            // reaped; an agent must never stay reserved for a dead call.
            if let Command::ReleaseAgent { agent } = &command {
                if let Err(e) = self.registry.release(&tenant, agent) {
                    warn!(agent = %agent, error = %e, "agent release failed");
                }
                continue;
            }
            let Some(record) = self.sessions.get(&session).map(|r| r.value().clone()) else {
                debug!(session = %session, "command for finished session dropped");
                continue;
            };
            match command {
                Command::PlayUtterance { text } => {
                    let spoken = self.localize_outbound(&record, text).await;
                    self.carrier.play(&record.call_id, &spoken).await;
                }
                Command::StartAiTurn => {
                    self.start_ai_turn(&session, &record).await;
                }
                Command::CancelAi => {
                    let cancelled = record.turns.lock().cancel_current();
                    if let Some(utterance_id) = cancelled {
                        if let Err(e) = self.ai.cancel(&session, utterance_id).await {
                            warn!(session = %session, error = %e, "AI cancel failed");
                        }
                    }
                }
                Command::RequestRouting { reason, department } => {
                    self.clone()
                        .start_transfer(session.clone(), tenant.clone(), reason, department);
                }
                Command::BridgeToAgent { agent } => {
                    let endpoint = self
                        .registry
                        .get_agent(&tenant, &agent)
                        .map(|a| format!("sip:{}@{}", a.extension, self.config.general.domain))
                        .unwrap_or_else(|_| format!("sip:{}@{}", agent, self.config.general.domain));
                    self.carrier.bridge(&record.call_id, &endpoint).await;
                }
                Command::RecordVoicemail { box_id } => {
                    self.carrier.record(&record.call_id, &box_id).await;
                    let message = self.voicemail.begin_message(
                        &tenant,
                        &box_id,
                        record.caller.clone(),
                        &session,
                    );
                    let _ = self.audit.emit(
                        &tenant,
                        EventDraft::new(AuditEventType::DataModification, "voicemail_record")
                            .with_session(session.as_str())
                            .with_payload(serde_json::json!({
                                "box": box_id,
                                "voicemail": message.id.to_string(),
                            })),
                    );
                }
                Command::BeginCallbackCapture => {
                    self.capture_callback(&session, &tenant, &record);
                }
                // Handled before the record lookup
                Command::ReleaseAgent { .. } => {}
            }
        }
    }

    /// Translate an outbound utterance into the caller's language when
    /// the session has one declared and the tenant opted in.
    async fn localize_outbound(&self, record: &Arc<ActiveSession>, text: String) -> String {
        if !record.translation_enabled {
            return text;
        }
        let Some(language) = record.language.lock().clone() else {
            return text;
        };
        let service = &self.config.general.service_language;
        if &language == service {
            return text;
        }
        self.translation.translate(&text, service, &language).await.text
    }

    /// Open a new AI utterance and pump its frames into the session.
    async fn start_ai_turn(&self, session: &SessionId, record: &Arc<ActiveSession>) {
        let utterance_id = record.turns.lock().begin();
        let mut transcript: Vec<String> = record.transcript.lock().clone();

        // The assistant works in the service language: bring the caller's
        // latest line into it before the turn starts.
        if record.translation_enabled {
            let language = record.language.lock().clone();
            if let Some(language) = language {
                let service = &self.config.general.service_language;
                if &language != service {
                    if let Some(line) = transcript
                        .iter_mut()
                        .rev()
                        .find(|l| l.starts_with("caller: "))
                    {
                        let original = line["caller: ".len()..].to_string();
                        let translated =
                            self.translation.translate(&original, &language, service).await;
                        *line = format!("caller: {}", translated.text);
                    }
                }
            }
        }

        match self
            .ai
            .start_utterance(session, utterance_id, &transcript)
            .await
        {
            Ok(mut frames) => {
                let record = record.clone();
                let session = session.clone();
                let translation = self.translation.clone();
                tokio::spawn(async move {
                    let mut assembled = String::new();
                    while let Some(frame) = frames.recv().await {
                        let accepted = record.turns.lock().accepts(&frame);
                        if !accepted {
                            debug!(session = %session, "stale AI frame dropped");
                            continue;
                        }
                        match frame {
                            AiInbound::Token { utterance_id, token } => {
                                assembled.push_str(&token);
                                record.handle.send(SessionEvent::AiToken {
                                    utterance_id,
                                    token,
                                });
                            }
                            AiInbound::UtteranceEnd { utterance_id } => {
                                record.turns.lock().finish(utterance_id);
                                record
                                    .transcript
                                    .lock()
                                    .push(format!("assistant: {}", assembled));
                                record.handle.send(SessionEvent::AiUtteranceEnd {
                                    utterance_id,
                                    text: assembled.clone(),
                                });
                                break;
                            }
                            AiInbound::FunctionCall { name, arguments, .. } => {
                                match name.as_str() {
                                    "transfer_to_human" => {
                                        let department = arguments
                                            .get("department")
                                            .and_then(|d| d.as_str())
                                            .map(DepartmentId::from);
                                        record.handle.send(SessionEvent::TransferRequested {
                                            reason: "assistant_requested_transfer".to_string(),
                                            department,
                                        });
                                        break;
                                    }
                                    // The assistant detected the caller's
                                    // language; later turns translate both ways
                                    "set_language" => {
                                        let requested = arguments
                                            .get("language")
                                            .and_then(|l| l.as_str());
                                        if let Some(language) = requested {
                                            if translation.supports(language) {
                                                *record.language.lock() =
                                                    Some(language.to_string());
                                                debug!(session = %session, language,
                                                       "caller language set by assistant");
                                            } else {
                                                warn!(session = %session, language,
                                                      "assistant requested unsupported language");
                                            }
                                        }
                                    }
                                    other => {
                                        debug!(session = %session, name = other,
                                               "unhandled assistant function call");
                                    }
                                }
                            }
                            AiInbound::CancelAck { utterance_id } => {
                                debug!(session = %session, utterance_id, "AI cancel acknowledged");
                            }
                            AiInbound::Error { detail } => {
                                record.handle.send(SessionEvent::AiFailed { reason: detail });
                                break;
                            }
                        }
                    }
                });
            }
            Err(e) => {
                record.handle.send(SessionEvent::AiFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Drive one transfer: select, offer, and retry through candidates
    /// until an agent accepts or the attempt budget is spent.
    fn start_transfer(
        self: Arc<Self>,
        session: SessionId,
        tenant: TenantId,
        reason: String,
        department: Option<DepartmentId>,
    ) {
        tokio::spawn(async move {
            let Some(record) = self.sessions.get(&session).map(|r| r.value().clone()) else {
                return;
            };
            record.handle.send(SessionEvent::RoutingStarted);

            let _ = self.audit.emit(
                &tenant,
                EventDraft::new(AuditEventType::DataAccess, "routing_requested")
                    .with_session(session.as_str())
                    .with_payload(serde_json::json!({ "reason": reason })),
            );

            let mut tracker = TransferTracker::new(self.config.routing.max_offer_attempts);
            loop {
                if tracker.exhausted() {
                    record.handle.send(SessionEvent::RoutingFailed);
                    return;
                }
                let criteria = RoutingCriteria {
                    department: department.clone().or_else(|| record.department.clone()),
                    exclude: tracker.tried(),
                    ..Default::default()
                };
                let agent = match self.routing.route(&tenant, &criteria) {
                    Ok(agent) => agent,
                    Err(_) => {
                        record.handle.send(SessionEvent::RoutingFailed);
                        return;
                    }
                };

                // Offer the call and wait for the agent's answer
                let (decision_tx, decision_rx) = oneshot::channel();
                self.offers.insert(
                    session.clone(),
                    PendingOffer {
                        agent: agent.clone(),
                        decision: Some(decision_tx),
                    },
                );
                debug!(session = %session, agent = %agent, "call offered to agent");

                let outcome =
                    match tokio::time::timeout(self.config.routing.offer_timeout, decision_rx)
                        .await
                    {
                        Ok(Ok(outcome)) => outcome,
                        _ => OfferOutcome::TimedOut,
                    };
                self.offers.remove(&session);
                tracker.record(agent.clone(), outcome);

                match outcome {
                    OfferOutcome::Accepted => {
                        record.handle.send(SessionEvent::AgentAccepted { agent });
                        return;
                    }
                    OfferOutcome::Rejected | OfferOutcome::TimedOut => {
                        // Return the reservation and try the next candidate
                        if let Err(e) = self.registry.release(&tenant, &agent) {
                            warn!(agent = %agent, error = %e, "release after refused offer failed");
                        }
                        record.handle.send(SessionEvent::AgentRejected { agent });
                    }
                }
            }
        });
    }

    /// Create a callback request from a session that fell back to capture.
    fn capture_callback(&self, session: &SessionId, tenant: &TenantId, record: &Arc<ActiveSession>) {
        let mut draft = CallbackDraft::new(record.caller.clone());
        draft.reason = Some("caller opted for callback during overflow".to_string());
        draft.callback_type = CallbackType::FollowUp;
        draft.department_id = record.department.clone();
        let schedule = CallbackSchedule::new(
            self.tenants
                .effective_hours(tenant, record.department.as_ref())
                .unwrap_or_default(),
        );
        match self.callbacks.create(tenant, draft, &schedule) {
            Ok(request) => {
                let _ = self.audit.emit(
                    tenant,
                    EventDraft::new(AuditEventType::CallbackCreated, "callback_capture")
                        .with_session(session.as_str())
                        .with_payload(serde_json::json!({ "callback": request.id.to_string() })),
                );
                record.handle.send(SessionEvent::CallbackCaptured);
            }
            Err(e) => {
                warn!(session = %session, error = %e, "callback capture failed");
                // Nothing to capture; end the call gracefully
                record.handle.send(SessionEvent::CallbackCaptured);
            }
        }
    }
}

/// Capacity telemetry over live engine state, consumed by the autoscaler.
pub struct EngineCapacitySource {
    engine: Arc<VoiceDeskEngine>,
    /// Host load sampler; defaults to an unstressed host
    host: Arc<dyn HostLoadSampler>,
}

/// Where CPU/memory pressure numbers come from
pub trait HostLoadSampler: Send + Sync {
    fn cpu_percent(&self) -> f64;
    fn memory_percent(&self) -> f64;
}

/// Unstressed host; deployments plug a real sampler in
pub struct CalmHost;

impl HostLoadSampler for CalmHost {
    fn cpu_percent(&self) -> f64 {
        0.0
    }
    fn memory_percent(&self) -> f64 {
        0.0
    }
}

impl EngineCapacitySource {
    pub fn new(engine: Arc<VoiceDeskEngine>, host: Arc<dyn HostLoadSampler>) -> Self {
        EngineCapacitySource { engine, host }
    }
}

#[async_trait]
impl CapacitySource for EngineCapacitySource {
    async fn sample(&self, tenant: Option<&TenantId>) -> CapacitySignal {
        let concurrent_calls = match tenant {
            Some(tenant) => self.engine.active_session_count(tenant) as u32,
            None => self.engine.total_active_sessions() as u32,
        };
        CapacitySignal {
            concurrent_calls,
            nominal_capacity: self.engine.config().general.max_concurrent_calls,
            cpu_percent: self.host.cpu_percent(),
            memory_percent: self.host.memory_percent(),
        }
    }
}

/// Callback egress dispatcher over the engine's carrier client.
pub struct EngineCallbackDispatcher {
    engine: Arc<VoiceDeskEngine>,
}

impl EngineCallbackDispatcher {
    pub fn new(engine: Arc<VoiceDeskEngine>) -> Self {
        EngineCallbackDispatcher { engine }
    }
}

#[async_trait]
impl voicedesk_callback_core::CallbackDispatcher for EngineCallbackDispatcher {
    async fn dispatch(
        &self,
        request: voicedesk_callback_core::CallbackRequest,
        agent: AgentId,
    ) -> std::result::Result<
        voicedesk_callback_core::AttemptReport,
        voicedesk_callback_core::DispatchError,
    > {
        let connected = self
            .engine
            .carrier
            .originate(&request.tenant_id, request.caller.as_str())
            .await;
        let _ = self.engine.audit.emit(
            &request.tenant_id,
            EventDraft::new(AuditEventType::CallbackAttempted, "callback_egress")
                .with_actor(agent.as_str())
                .with_payload(serde_json::json!({
                    "callback": request.id.to_string(),
                    "connected": connected,
                })),
        );
        Ok(voicedesk_callback_core::AttemptReport {
            outcome: if connected {
                AttemptOutcome::Connected
            } else {
                AttemptOutcome::NoAnswer
            },
            session: None,
            issue_resolved: connected,
            notes: None,
        })
    }
}
