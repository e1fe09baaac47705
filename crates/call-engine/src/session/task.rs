//! The per-session task
//!
//! Owns a session from ingress to teardown. Suspends on its mailbox with
//! the current state's timeout; every wakeup is either an event or a
//! state expiry. No lock is held across a suspension point — the shared
//! snapshot is updated in short write sections between awaits.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voicedesk_audit_core::{AuditEventType, AuditLog, EventDraft};
use voicedesk_infra_common::{AgentId, SessionId, TenantId};
use voicedesk_ledger_core::CreditLedger;

use crate::config::SessionTimeouts;
use crate::session::transitions::transition;
use crate::session::types::{
    Command, ConversationTurn, SessionContext, SessionEvent, SessionState, Speaker,
    TerminationOutcome,
};

/// A command emitted by a session, addressed for the engine's processor.
#[derive(Debug, Clone)]
pub struct SessionCommand {
    pub session: SessionId,
    pub tenant: TenantId,
    pub command: Command,
}

/// Observable state of a live (or just-finished) session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub tenant_id: TenantId,
    pub state: SessionState,
    pub outcome: Option<TerminationOutcome>,
    pub ai_attempts: u32,
    pub assigned_agent: Option<AgentId>,
    pub turn_count: usize,
    pub opened_at: DateTime<Utc>,
}

/// Sender half of a session's mailbox.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub tenant_id: TenantId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Deliver an event. Events for a finished session are dropped with a
    /// warning — termination races safely with every other event.
    pub fn send(&self, event: SessionEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %self.id, "event dropped for finished session: {:?}", e.0);
                false
            }
        }
    }
}

/// Spawn the task owning one session.
///
/// Returns the mailbox handle, a shared snapshot the engine reads for
/// stats and admission gates, and a receiver that yields the terminal
/// outcome exactly once.
pub fn spawn_session(
    ctx: SessionContext,
    timeouts: SessionTimeouts,
    ledger: Arc<CreditLedger>,
    audit: Arc<AuditLog>,
    commands: mpsc::UnboundedSender<SessionCommand>,
) -> (
    SessionHandle,
    Arc<RwLock<SessionSnapshot>>,
    mpsc::UnboundedReceiver<(SessionId, TerminationOutcome)>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();

    let snapshot = Arc::new(RwLock::new(SessionSnapshot {
        id: ctx.session_id.clone(),
        tenant_id: ctx.tenant_id.clone(),
        state: SessionState::Ingress,
        outcome: None,
        ai_attempts: 0,
        assigned_agent: None,
        turn_count: 0,
        opened_at: ctx.opened_at,
    }));

    let handle = SessionHandle {
        id: ctx.session_id.clone(),
        tenant_id: ctx.tenant_id.clone(),
        tx: event_tx.clone(),
    };

    // Kick the machine out of ingress
    let _ = event_tx.send(SessionEvent::Opened);

    let view = snapshot.clone();
    tokio::spawn(run_session(
        ctx, timeouts, ledger, audit, commands, event_rx, view, closed_tx,
    ));

    (handle, snapshot, closed_rx)
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    mut ctx: SessionContext,
    timeouts: SessionTimeouts,
    ledger: Arc<CreditLedger>,
    audit: Arc<AuditLog>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    closed: mpsc::UnboundedSender<(SessionId, TerminationOutcome)>,
) {
    let started = Instant::now();
    let mut state = SessionState::Ingress;
    let mut transcript: Vec<ConversationTurn> = Vec::new();
    let mut outcome = TerminationOutcome::CarrierFailure;

    info!(session = %ctx.session_id, tenant = %ctx.tenant_id, "session task started");

    while !state.is_terminal() {
        let wait = timeouts.for_state(state);
        let event = match tokio::time::timeout(wait, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Every sender dropped; the engine is gone
                SessionEvent::CarrierError {
                    detail: "session mailbox closed".to_string(),
                }
            }
            Err(_) => SessionEvent::StateTimeout { state },
        };

        // Transcript bookkeeping before the transition
        match &event {
            SessionEvent::CallerUtterance { transcript: text } => {
                transcript.push(ConversationTurn {
                    speaker: Speaker::Caller,
                    text: text.clone(),
                    at: Utc::now(),
                });
            }
            SessionEvent::AiUtteranceEnd { text, .. } => {
                transcript.push(ConversationTurn {
                    speaker: Speaker::Assistant,
                    text: text.clone(),
                    at: Utc::now(),
                });
            }
            SessionEvent::AgentAccepted { agent } => {
                ctx.assigned_agent = Some(agent.clone());
            }
            _ => {}
        }

        let result = transition(&ctx, state, &event);
        debug!(session = %ctx.session_id, from = state.as_str(), to = result.next.as_str(),
               commands = result.commands.len(), "session transition");

        // Context updates driven by emitted commands
        for command in &result.commands {
            if *command == Command::StartAiTurn {
                ctx.ai_attempts += 1;
            }
        }

        state = result.next;
        if let Some(o) = result.outcome {
            outcome = o;
        }

        {
            let mut view = snapshot.write();
            view.state = state;
            view.outcome = result.outcome;
            view.ai_attempts = ctx.ai_attempts;
            view.assigned_agent = ctx.assigned_agent.clone();
            view.turn_count = transcript.len();
        }

        for command in result.commands {
            let _ = commands.send(SessionCommand {
                session: ctx.session_id.clone(),
                tenant: ctx.tenant_id.clone(),
                command,
            });
        }
    }

    finalize(&ctx, outcome, started, &transcript, &ledger, &audit);
    let _ = closed.send((ctx.session_id.clone(), outcome));
    info!(session = %ctx.session_id, outcome = outcome.as_str(), "session task finished");
}

/// Terminal commit: the rounded-up debit and the session-close audit
/// record happen together, with no suspension point between them.
///
/// A ledger refusal (tenant deactivated mid-call) never tears the record
/// down — the close event carries `best_effort` for reconciliation.
fn finalize(
    ctx: &SessionContext,
    outcome: TerminationOutcome,
    started: Instant,
    transcript: &[ConversationTurn],
    ledger: &CreditLedger,
    audit: &AuditLog,
) {
    let seconds = (started.elapsed().as_secs_f64().ceil() as i64).max(1);

    let debit = ledger.debit(&ctx.tenant_id, seconds, &ctx.call_id);
    let best_effort = debit.is_err();
    if let Err(ref e) = debit {
        warn!(session = %ctx.session_id, error = %e,
              "terminal debit refused; recorded as best effort");
    }

    let draft = EventDraft::new(AuditEventType::CallCompleted, "session_close")
        .with_session(ctx.session_id.as_str())
        .with_payload(serde_json::json!({
            "outcome": outcome.as_str(),
            "duration_seconds": seconds,
            "ai_turns": ctx.ai_attempts,
            "conversation_turns": transcript.len(),
            "best_effort": best_effort,
        }));
    if let Err(e) = audit.emit(&ctx.tenant_id, draft) {
        // Never silently suppressed: the violation is itself recorded
        warn!(session = %ctx.session_id, error = %e, "session close audit rejected");
        let _ = audit.emit(
            &ctx.tenant_id,
            EventDraft::new(AuditEventType::PrivacyViolation, "session_close_rejected")
                .failed(e.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicedesk_audit_core::{CallerFingerprint, QueryFilter};
    use voicedesk_directory_core::FallbackTarget;
    use voicedesk_infra_common::CallId;

    fn deps() -> (Arc<CreditLedger>, Arc<AuditLog>) {
        (
            Arc::new(CreditLedger::new()),
            Arc::new(AuditLog::new("task-test-salt")),
        )
    }

    fn ctx(tenant: &TenantId) -> SessionContext {
        SessionContext {
            session_id: SessionId::new(),
            tenant_id: tenant.clone(),
            call_id: CallId::new(),
            caller: CallerFingerprint("hash".into()),
            greeting_text: "Hello!".into(),
            ai_fallback_text: "One moment.".into(),
            ai_attempts: 0,
            max_transfer_attempts: 3,
            fallback: FallbackTarget::Voicemail,
            voicemail_box: "vm".into(),
            department: None,
            assigned_agent: None,
            opened_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn session_reaches_terminated_and_debits_once() {
        let tenant = TenantId::from("tenant-task");
        let (ledger, audit) = deps();
        ledger.configure_tenant(&tenant, 1000, 1);

        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
        let (handle, snapshot, mut closed) = spawn_session(
            ctx(&tenant),
            SessionTimeouts::default(),
            ledger.clone(),
            audit.clone(),
            commands_tx,
        );

        handle.send(SessionEvent::CallerUtterance {
            transcript: "hi".into(),
        });
        handle.send(SessionEvent::CallerHangup);

        let (_, outcome) = closed.recv().await.unwrap();
        assert_eq!(outcome, TerminationOutcome::ResolvedByAi);
        assert_eq!(snapshot.read().state, SessionState::Terminated);

        // Exactly one debit, rounded up to at least a second
        assert!(ledger.current_usage(&tenant) >= 1);
        assert_eq!(
            audit.count_by_type(&tenant, AuditEventType::CallCompleted),
            1
        );

        // The greeting and AI turn commands were emitted
        let mut saw_greeting = false;
        let mut saw_ai_turn = false;
        while let Ok(command) = commands_rx.try_recv() {
            match command.command {
                Command::PlayUtterance { .. } => saw_greeting = true,
                Command::StartAiTurn => saw_ai_turn = true,
                _ => {}
            }
        }
        assert!(saw_greeting);
        assert!(saw_ai_turn);
    }

    #[tokio::test]
    async fn events_after_termination_are_dropped() {
        let tenant = TenantId::from("tenant-task");
        let (ledger, audit) = deps();
        ledger.configure_tenant(&tenant, 1000, 1);

        let (commands_tx, _commands_rx) = mpsc::unbounded_channel();
        let (handle, _snapshot, mut closed) = spawn_session(
            ctx(&tenant),
            SessionTimeouts::default(),
            ledger,
            audit,
            commands_tx,
        );

        handle.send(SessionEvent::CallerHangup);
        closed.recv().await.unwrap();

        // The mailbox is gone; delivery reports the drop instead of
        // panicking or resurrecting the session
        let delivered = handle.send(SessionEvent::CallerUtterance {
            transcript: "anyone there?".into(),
        });
        assert!(!delivered);
    }

    #[tokio::test]
    async fn ledger_refusal_still_reaches_terminated() {
        let tenant = TenantId::from("tenant-task");
        let (ledger, audit) = deps();
        ledger.configure_tenant(&tenant, 1000, 1);
        ledger.set_active(&tenant, false).unwrap();

        let (commands_tx, _commands_rx) = mpsc::unbounded_channel();
        let (handle, snapshot, mut closed) = spawn_session(
            ctx(&tenant),
            SessionTimeouts::default(),
            ledger.clone(),
            audit.clone(),
            commands_tx,
        );

        handle.send(SessionEvent::CallerHangup);
        closed.recv().await.unwrap();
        assert_eq!(snapshot.read().state, SessionState::Terminated);

        // Debit refused, close event still present and flagged
        assert_eq!(ledger.current_usage(&tenant), 0);
        let events = audit.query(&tenant, QueryFilter::default());
        let close = events
            .iter()
            .find(|e| e.action == "session_close")
            .unwrap();
        assert_eq!(close.payload["best_effort"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn state_timeout_terminates_with_timeout_outcome() {
        let tenant = TenantId::from("tenant-task");
        let (ledger, audit) = deps();
        ledger.configure_tenant(&tenant, 1000, 1);

        let mut timeouts = SessionTimeouts::default();
        timeouts.greeting = std::time::Duration::from_millis(50);

        let (commands_tx, _commands_rx) = mpsc::unbounded_channel();
        let (_handle, _snapshot, mut closed) =
            spawn_session(ctx(&tenant), timeouts, ledger, audit, commands_tx);

        // No caller input after the greeting: the state expires
        let (_, outcome) = closed.recv().await.unwrap();
        assert_eq!(outcome, TerminationOutcome::Timeout);
    }
}
