//! Session states, events, and commands
//!
//! The orchestrator is a state machine: events go in, a new state and a
//! list of commands come out. The transition function in
//! [`super::transitions`] is pure; everything with a side effect happens
//! in the session task or the engine's command processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voicedesk_audit_core::CallerFingerprint;
use voicedesk_directory_core::FallbackTarget;
use voicedesk_infra_common::{AgentId, CallId, DepartmentId, SessionId, TenantId};

/// Session lifecycle states. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Ingress,
    Greeting,
    AiTurn,
    WaitingCaller,
    Classifying,
    Routing,
    Voicemail,
    CallbackCapture,
    Bridged,
    Terminated,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        *self == SessionState::Terminated
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Ingress => "ingress",
            SessionState::Greeting => "greeting",
            SessionState::AiTurn => "ai_turn",
            SessionState::WaitingCaller => "waiting_caller",
            SessionState::Classifying => "classifying",
            SessionState::Routing => "routing",
            SessionState::Voicemail => "voicemail",
            SessionState::CallbackCapture => "callback_capture",
            SessionState::Bridged => "bridged",
            SessionState::Terminated => "terminated",
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationOutcome {
    /// Caller hung up satisfied after AI turns
    ResolvedByAi,
    /// Caller abandoned before any AI exchange
    CallerAbandoned,
    /// Call was bridged to a human agent
    Transferred,
    VoicemailLeft,
    CallbackCaptured,
    Timeout,
    CarrierFailure,
}

impl TerminationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationOutcome::ResolvedByAi => "resolved_by_ai",
            TerminationOutcome::CallerAbandoned => "caller_abandoned",
            TerminationOutcome::Transferred => "transferred",
            TerminationOutcome::VoicemailLeft => "voicemail_left",
            TerminationOutcome::CallbackCaptured => "callback_captured",
            TerminationOutcome::Timeout => "timeout",
            TerminationOutcome::CarrierFailure => "carrier_failure",
        }
    }
}

/// Events consumed by a session's mailbox
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Internal kick-off after admission
    Opened,
    /// Caller speech (already transcribed by the media layer)
    CallerUtterance { transcript: String },
    /// One streamed AI token
    AiToken { utterance_id: u64, token: String },
    /// The AI closed its utterance; `text` is the assembled reply
    AiUtteranceEnd { utterance_id: u64, text: String },
    AiFailed { reason: String },
    /// AI-driven escalation to a human
    TransferRequested {
        reason: String,
        department: Option<DepartmentId>,
    },
    /// Engine confirmation that routing started
    RoutingStarted,
    /// Agent-side answer to an offer
    AgentAccepted { agent: AgentId },
    AgentRejected { agent: AgentId },
    /// Every candidate was tried or none existed
    RoutingFailed,
    CallerHangup,
    AgentHangup,
    CarrierError { detail: String },
    /// Voicemail recording finished
    RecordingComplete,
    /// Callback details captured from the caller
    CallbackCaptured,
    /// Wall-clock expiry of the named state
    StateTimeout { state: SessionState },
}

/// Commands emitted by transitions, executed by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// carrier.play
    PlayUtterance { text: String },
    /// Open a new AI turn for the transcript so far
    StartAiTurn,
    /// Abort the in-flight AI utterance (barge-in); the engine resolves
    /// which utterance is current
    CancelAi,
    /// Ask routing for an agent
    RequestRouting {
        reason: String,
        department: Option<DepartmentId>,
    },
    /// carrier.bridge
    BridgeToAgent { agent: AgentId },
    /// carrier.record
    RecordVoicemail { box_id: String },
    /// Start collecting callback details from the caller
    BeginCallbackCapture,
    /// Return the agent's reserved capacity
    ReleaseAgent { agent: AgentId },
}

/// Per-session context the transition function reads. Mutated only by the
/// session task between transitions.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub tenant_id: TenantId,
    pub call_id: CallId,
    pub caller: CallerFingerprint,
    pub greeting_text: String,
    pub ai_fallback_text: String,
    /// AI turns opened so far
    pub ai_attempts: u32,
    /// Force routing past this many AI turns
    pub max_transfer_attempts: u32,
    pub fallback: FallbackTarget,
    pub voicemail_box: String,
    pub department: Option<DepartmentId>,
    pub assigned_agent: Option<AgentId>,
    pub opened_at: DateTime<Utc>,
}

/// Result of one transition: the next state, commands to run, and the
/// outcome when the next state is terminal.
#[derive(Debug, Clone)]
pub struct Transition {
    pub next: SessionState,
    pub commands: Vec<Command>,
    pub outcome: Option<TerminationOutcome>,
}

impl Transition {
    pub fn stay(state: SessionState) -> Self {
        Transition {
            next: state,
            commands: Vec::new(),
            outcome: None,
        }
    }

    pub fn to(next: SessionState, commands: Vec<Command>) -> Self {
        Transition {
            next,
            commands,
            outcome: None,
        }
    }

    pub fn terminate(outcome: TerminationOutcome, commands: Vec<Command>) -> Self {
        Transition {
            next: SessionState::Terminated,
            commands,
            outcome: Some(outcome),
        }
    }
}

/// One entry of the session's conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Caller,
    Assistant,
}
