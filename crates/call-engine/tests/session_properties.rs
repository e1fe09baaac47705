//! Property tests for the session state machine
//!
//! The transition function must keep every session on a path that ends in
//! `terminated`: timeouts always make progress toward a terminal state,
//! and no event sequence escapes the state set or resurrects a dead
//! session.

use chrono::Utc;
use proptest::prelude::*;

use voicedesk_audit_core::CallerFingerprint;
use voicedesk_call_engine::session::{transition, SessionContext, SessionEvent, SessionState};
use voicedesk_directory_core::FallbackTarget;
use voicedesk_infra_common::{AgentId, CallId, DepartmentId, SessionId, TenantId};

fn ctx(fallback: FallbackTarget, ai_attempts: u32) -> SessionContext {
    SessionContext {
        session_id: SessionId::new(),
        tenant_id: TenantId::from("tenant-prop"),
        call_id: CallId::from("call-prop"),
        caller: CallerFingerprint("hash".into()),
        greeting_text: "Hello".into(),
        ai_fallback_text: "One moment".into(),
        ai_attempts,
        max_transfer_attempts: 3,
        fallback,
        voicemail_box: "vm".into(),
        department: None,
        assigned_agent: None,
        opened_at: Utc::now(),
    }
}

fn any_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Ingress),
        Just(SessionState::Greeting),
        Just(SessionState::AiTurn),
        Just(SessionState::WaitingCaller),
        Just(SessionState::Classifying),
        Just(SessionState::Routing),
        Just(SessionState::Voicemail),
        Just(SessionState::CallbackCapture),
        Just(SessionState::Bridged),
    ]
}

fn any_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        Just(SessionEvent::Opened),
        Just(SessionEvent::CallerUtterance {
            transcript: "hello".into()
        }),
        Just(SessionEvent::AiToken {
            utterance_id: 1,
            token: "t".into()
        }),
        Just(SessionEvent::AiUtteranceEnd {
            utterance_id: 1,
            text: "reply".into()
        }),
        Just(SessionEvent::AiFailed {
            reason: "down".into()
        }),
        Just(SessionEvent::TransferRequested {
            reason: "help".into(),
            department: None
        }),
        Just(SessionEvent::RoutingStarted),
        Just(SessionEvent::AgentAccepted {
            agent: AgentId::from("agent-1")
        }),
        Just(SessionEvent::AgentRejected {
            agent: AgentId::from("agent-1")
        }),
        Just(SessionEvent::RoutingFailed),
        Just(SessionEvent::CallerHangup),
        Just(SessionEvent::AgentHangup),
        Just(SessionEvent::CarrierError {
            detail: "lost".into()
        }),
        Just(SessionEvent::RecordingComplete),
        Just(SessionEvent::CallbackCaptured),
    ]
}

proptest! {
    /// A matching state timeout always makes progress: either the session
    /// terminates, or (routing only) it falls back toward a capture state
    /// whose own timeout terminates.
    #[test]
    fn timeouts_always_make_progress(state in any_state(),
                                     fallback in prop_oneof![
                                         Just(FallbackTarget::Voicemail),
                                         Just(FallbackTarget::CallbackCapture)
                                     ]) {
        let context = ctx(fallback, 0);
        let result = transition(&context, state, &SessionEvent::StateTimeout { state });
        if state == SessionState::Routing {
            prop_assert!(matches!(
                result.next,
                SessionState::Voicemail | SessionState::CallbackCapture
            ));
        } else {
            prop_assert_eq!(result.next, SessionState::Terminated);
            prop_assert!(result.outcome.is_some());
        }
    }

    /// No event sequence leaves the state set, and the machine cannot
    /// leave `terminated` once it is there.
    #[test]
    fn event_sequences_stay_in_the_machine(
        events in proptest::collection::vec(any_event(), 0..40),
        department_routed in any::<bool>(),
    ) {
        let fallback = if department_routed {
            FallbackTarget::CallbackCapture
        } else {
            FallbackTarget::Voicemail
        };
        let mut context = ctx(fallback, 0);
        let mut state = SessionState::Ingress;

        for event in &events {
            if state.is_terminal() {
                break;
            }
            let result = transition(&context, state, event);
            // Mirror the task's context bookkeeping
            for command in &result.commands {
                if matches!(command, voicedesk_call_engine::session::Command::StartAiTurn) {
                    context.ai_attempts += 1;
                }
            }
            if let SessionEvent::AgentAccepted { agent } = event {
                context.assigned_agent = Some(agent.clone());
            }
            state = result.next;
            if state == SessionState::Terminated {
                prop_assert!(result.outcome.is_some(),
                             "terminal transition must carry an outcome");
            }
        }

        // Whatever happened, a hangup (or the current state's timeout)
        // now finishes the call in bounded steps.
        if !state.is_terminal() {
            let result = transition(&context, state, &SessionEvent::CallerHangup);
            prop_assert_eq!(result.next, SessionState::Terminated);
        }
    }

    /// The AI attempt budget is enforced: once spent, caller speech routes
    /// instead of opening another turn.
    #[test]
    fn attempt_budget_forces_escalation(attempts in 3u32..10) {
        let context = ctx(FallbackTarget::Voicemail, attempts);
        let result = transition(
            &context,
            SessionState::WaitingCaller,
            &SessionEvent::CallerUtterance { transcript: "still here".into() },
        );
        prop_assert_eq!(result.next, SessionState::Classifying);
    }
}

#[test]
fn department_override_flows_into_routing_command() {
    let context = ctx(FallbackTarget::Voicemail, 0);
    let result = transition(
        &context,
        SessionState::WaitingCaller,
        &SessionEvent::TransferRequested {
            reason: "billing question".into(),
            department: Some(DepartmentId::from("dept-billing")),
        },
    );
    match &result.commands[0] {
        voicedesk_call_engine::session::Command::RequestRouting { department, .. } => {
            assert_eq!(department, &Some(DepartmentId::from("dept-billing")));
        }
        other => panic!("unexpected command {:?}", other),
    }
}
