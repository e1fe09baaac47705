//! The session transition function
//!
//! Pure: `(context, state, event) -> (next state, commands)`. No clock, no
//! I/O, no locks. The session task applies the result and the engine
//! executes the commands.

use voicedesk_directory_core::FallbackTarget;

use crate::session::types::{
    Command, SessionContext, SessionEvent, SessionState, TerminationOutcome, Transition,
};

/// Compute the transition for one event.
///
/// Events that make no sense in the current state leave it unchanged; the
/// task logs them. `Terminated` is absorbing and handled before this is
/// called.
pub fn transition(ctx: &SessionContext, state: SessionState, event: &SessionEvent) -> Transition {
    use SessionEvent::*;
    use SessionState::*;

    // Cross-state events first: these mean the same thing everywhere.
    match event {
        CallerHangup => return on_caller_hangup(ctx, state),
        CarrierError { .. } => {
            return Transition::terminate(TerminationOutcome::CarrierFailure, release_cmds(ctx));
        }
        StateTimeout { state: expired } if *expired == state => {
            return on_timeout(ctx, state);
        }
        StateTimeout { .. } => return Transition::stay(state), // stale timer
        _ => {}
    }

    match (state, event) {
        (Ingress, Opened) => Transition::to(
            Greeting,
            vec![Command::PlayUtterance {
                text: ctx.greeting_text.clone(),
            }],
        ),

        (Greeting, CallerUtterance { .. }) | (WaitingCaller, CallerUtterance { .. }) => {
            open_ai_turn(ctx)
        }

        // Barge-in: caller speech cancels the in-flight utterance and
        // opens a fresh turn (or forces routing once the budget is spent;
        // the cancel still goes out either way).
        (AiTurn, CallerUtterance { .. }) => {
            let followup = open_ai_turn(ctx);
            let mut commands = vec![Command::CancelAi];
            commands.extend(followup.commands);
            Transition::to(followup.next, commands)
        }

        (AiTurn, AiToken { .. }) => Transition::stay(AiTurn),

        (AiTurn, AiUtteranceEnd { text, .. }) => Transition::to(
            WaitingCaller,
            vec![Command::PlayUtterance { text: text.clone() }],
        ),

        // Provider failure degrades to the canned line and forces routing
        (AiTurn, AiFailed { reason }) => Transition::to(
            Classifying,
            vec![
                Command::PlayUtterance {
                    text: ctx.ai_fallback_text.clone(),
                },
                Command::RequestRouting {
                    reason: format!("ai_failure: {}", reason),
                    department: ctx.department.clone(),
                },
            ],
        ),

        (AiTurn, TransferRequested { reason, department })
        | (WaitingCaller, TransferRequested { reason, department })
        | (Greeting, TransferRequested { reason, department }) => Transition::to(
            Classifying,
            vec![Command::RequestRouting {
                reason: reason.clone(),
                department: department.clone().or_else(|| ctx.department.clone()),
            }],
        ),

        (Classifying, RoutingStarted) => Transition::to(Routing, Vec::new()),

        (Routing, AgentAccepted { agent }) => Transition::to(
            Bridged,
            vec![Command::BridgeToAgent {
                agent: agent.clone(),
            }],
        ),

        // The engine advances to the next candidate; nothing to do here
        (Routing, AgentRejected { .. }) => Transition::stay(Routing),

        (Routing, RoutingFailed) => fallback_transition(ctx),

        (Bridged, AgentHangup) => {
            Transition::terminate(TerminationOutcome::Transferred, release_cmds(ctx))
        }

        (Voicemail, RecordingComplete) => {
            Transition::terminate(TerminationOutcome::VoicemailLeft, Vec::new())
        }

        (CallbackCapture, CallbackCaptured) => {
            Transition::terminate(TerminationOutcome::CallbackCaptured, Vec::new())
        }

        // Anything else is a no-op in this state
        (state, _) => Transition::stay(state),
    }
}

/// Open a new AI turn, or force routing once the attempt budget is spent.
fn open_ai_turn(ctx: &SessionContext) -> Transition {
    if ctx.ai_attempts >= ctx.max_transfer_attempts {
        return Transition::to(
            SessionState::Classifying,
            vec![Command::RequestRouting {
                reason: "max_ai_attempts_reached".to_string(),
                department: ctx.department.clone(),
            }],
        );
    }
    Transition::to(SessionState::AiTurn, vec![Command::StartAiTurn])
}

fn on_caller_hangup(ctx: &SessionContext, state: SessionState) -> Transition {
    let outcome = match state {
        SessionState::Bridged => TerminationOutcome::Transferred,
        SessionState::Voicemail => TerminationOutcome::VoicemailLeft,
        SessionState::CallbackCapture => TerminationOutcome::CallbackCaptured,
        _ if ctx.ai_attempts > 0 => TerminationOutcome::ResolvedByAi,
        _ => TerminationOutcome::CallerAbandoned,
    };
    Transition::terminate(outcome, release_cmds(ctx))
}

fn on_timeout(ctx: &SessionContext, state: SessionState) -> Transition {
    match state {
        // Routing expiry falls back per tenant policy rather than killing
        // the call
        SessionState::Routing => fallback_transition(ctx),
        _ => Transition::terminate(TerminationOutcome::Timeout, release_cmds(ctx)),
    }
}

fn fallback_transition(ctx: &SessionContext) -> Transition {
    match ctx.fallback {
        FallbackTarget::Voicemail => Transition::to(
            SessionState::Voicemail,
            vec![Command::RecordVoicemail {
                box_id: ctx.voicemail_box.clone(),
            }],
        ),
        FallbackTarget::CallbackCapture => Transition::to(
            SessionState::CallbackCapture,
            vec![Command::BeginCallbackCapture],
        ),
    }
}

fn release_cmds(ctx: &SessionContext) -> Vec<Command> {
    match &ctx.assigned_agent {
        Some(agent) => vec![Command::ReleaseAgent {
            agent: agent.clone(),
        }],
        None => Vec::new(),
    }
}
