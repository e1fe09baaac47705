//! Property tests for credit conservation and debit idempotency

use proptest::prelude::*;
use voicedesk_infra_common::{CallId, TenantId};
use voicedesk_ledger_core::{CreditLedger, DebitOutcome};

#[derive(Debug, Clone)]
enum Op {
    Debit { call: u8, seconds: i64 },
    Credit { seconds: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 1i64..120).prop_map(|(call, seconds)| Op::Debit { call, seconds }),
        (1i64..120).prop_map(|seconds| Op::Credit { seconds }),
    ]
}

proptest! {
    #[test]
    fn usage_is_always_the_transaction_fold(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let ledger = CreditLedger::new();
        let tenant = TenantId::from("tenant-prop");
        ledger.configure_tenant(&tenant, 100_000, 1);

        for op in ops {
            match op {
                Op::Debit { call, seconds } => {
                    let _ = ledger.debit(&tenant, seconds, &CallId::from(format!("call-{}", call)));
                }
                Op::Credit { seconds } => {
                    ledger.credit(&tenant, seconds, "prop_credit").unwrap();
                }
            }
            let fold: i64 = ledger
                .transactions(&tenant)
                .iter()
                .map(|t| t.amount_seconds)
                .sum();
            prop_assert_eq!(fold, ledger.current_usage(&tenant));
        }
    }

    #[test]
    fn repeated_debits_by_call_id_apply_once(seconds in 1i64..300, repeats in 1usize..6) {
        let ledger = CreditLedger::new();
        let tenant = TenantId::from("tenant-prop");
        ledger.configure_tenant(&tenant, 100_000, 1);
        let call = CallId::from("call-repeated");

        let mut committed = 0usize;
        for _ in 0..repeats {
            match ledger.debit(&tenant, seconds, &call).unwrap() {
                DebitOutcome::Committed { .. } => committed += 1,
                DebitOutcome::AlreadyApplied => {}
            }
        }
        prop_assert_eq!(committed, 1);
        prop_assert_eq!(ledger.current_usage(&tenant), seconds);
    }

    #[test]
    fn tenants_never_see_each_other(ops in proptest::collection::vec((0usize..2, 1i64..60), 1..30)) {
        let ledger = CreditLedger::new();
        let tenants = [TenantId::from("tenant-a"), TenantId::from("tenant-b")];
        for t in &tenants {
            ledger.configure_tenant(t, 100_000, 1);
        }
        let mut expected = [0i64, 0i64];
        for (idx, (which, seconds)) in ops.iter().enumerate() {
            let call = CallId::from(format!("call-{}", idx));
            ledger.debit(&tenants[*which], *seconds, &call).unwrap();
            expected[*which] += seconds;
        }
        prop_assert_eq!(ledger.current_usage(&tenants[0]), expected[0]);
        prop_assert_eq!(ledger.current_usage(&tenants[1]), expected[1]);
    }
}

#[tokio::test]
async fn concurrent_debits_conserve_the_fold() {
    use std::sync::Arc;

    let ledger = Arc::new(CreditLedger::new());
    let tenant = TenantId::from("tenant-conc");
    ledger.configure_tenant(&tenant, 1_000_000, 1);

    let mut handles = Vec::new();
    for worker in 0..8 {
        let ledger = ledger.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                let call = CallId::from(format!("call-{}-{}", worker, i));
                ledger.debit(&tenant, 3, &call).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(ledger.current_usage(&tenant), 8 * 50 * 3);
    let fold: i64 = ledger
        .transactions(&tenant)
        .iter()
        .map(|t| t.amount_seconds)
        .sum();
    assert_eq!(fold, ledger.current_usage(&tenant));
}
