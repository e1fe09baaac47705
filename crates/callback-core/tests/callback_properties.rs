//! Property tests for callback lifecycle invariants
//!
//! Attempts are non-decreasing and status transitions follow the fixed
//! DAG, whatever order operations arrive in.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use voicedesk_audit_core::CallerFingerprint;
use voicedesk_callback_core::{
    AttemptOutcome, CallbackDraft, CallbackSchedule, CallbackStatus, CallbackStore,
};
use voicedesk_infra_common::{AgentId, TenantId};

#[derive(Debug, Clone)]
enum Op {
    Claim,
    Record(AttemptOutcome, bool),
    Cancel,
    Expire,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Claim),
        (
            prop_oneof![
                Just(AttemptOutcome::Connected),
                Just(AttemptOutcome::NoAnswer),
                Just(AttemptOutcome::Busy),
                Just(AttemptOutcome::Invalid),
                Just(AttemptOutcome::Failed),
            ],
            any::<bool>()
        )
            .prop_map(|(o, r)| Op::Record(o, r)),
        Just(Op::Cancel),
        Just(Op::Expire),
    ]
}

fn allowed(from: CallbackStatus, to: CallbackStatus) -> bool {
    from == to || from.can_transition_to(to)
}

proptest! {
    #[test]
    fn attempts_monotonic_and_dag_respected(ops in proptest::collection::vec(op_strategy(), 0..30)) {
        let store = CallbackStore::new();
        let tenant = TenantId::from("tenant-prop");
        let agent = AgentId::from("agent-prop");
        let request = store
            .create(
                &tenant,
                CallbackDraft::new(CallerFingerprint("hash".into())),
                &CallbackSchedule::default(),
            )
            .unwrap();

        let mut last_attempts = 0u32;
        let mut last_status = request.status;

        for op in ops {
            match op {
                Op::Claim => {
                    let _ = store.claim(&request.id, &agent);
                }
                Op::Record(outcome, resolved) => {
                    let _ = store.record_attempt(
                        &tenant, &request.id, Some(agent.clone()), outcome, None, resolved, None,
                    );
                }
                Op::Cancel => {
                    let _ = store.cancel(&tenant, &request.id, "prop");
                }
                Op::Expire => {
                    // Sweep with a clock far past any window
                    store.expire_lapsed(Utc::now() + Duration::days(30));
                }
            }
            let current = store.get(&tenant, &request.id).unwrap();
            prop_assert!(current.attempts >= last_attempts,
                         "attempts regressed: {} -> {}", last_attempts, current.attempts);
            prop_assert!(current.attempts <= current.max_attempts);
            prop_assert!(allowed(last_status, current.status),
                         "illegal transition {:?} -> {:?}", last_status, current.status);
            // Terminal states stay terminal
            if last_status.is_terminal() {
                prop_assert_eq!(last_status, current.status);
            }
            last_attempts = current.attempts;
            last_status = current.status;
        }
    }

    #[test]
    fn due_selection_is_tenant_isolated(count_a in 1usize..6, count_b in 1usize..6) {
        let store = CallbackStore::new();
        let schedule = CallbackSchedule::default();
        let tenant_a = TenantId::from("tenant-a");
        let tenant_b = TenantId::from("tenant-b");
        for _ in 0..count_a {
            store.create(&tenant_a, CallbackDraft::new(CallerFingerprint("h".into())), &schedule).unwrap();
        }
        for _ in 0..count_b {
            store.create(&tenant_b, CallbackDraft::new(CallerFingerprint("h".into())), &schedule).unwrap();
        }

        let due = store.due_requests(&voicedesk_callback_core::DueQuery {
            now: Utc::now(),
            limit: 100,
            tenant: Some(tenant_a.clone()),
        });
        prop_assert_eq!(due.len(), count_a);
        prop_assert!(due.iter().all(|r| r.tenant_id == tenant_a));
    }
}
