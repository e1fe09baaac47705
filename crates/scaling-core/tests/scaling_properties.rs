//! Property tests for autoscaler bounds
//!
//! After any sequence of evaluations, `min_instances <= current <=
//! max_instances`; consecutive scale-ups are separated by the up-cooldown.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use voicedesk_infra_common::TenantId;
use voicedesk_scaling_core::{
    AutoScaler, CapacitySignal, CapacitySource, ScalingAction, ScalingExecutor, ScalingPolicy,
};

struct SettableSource {
    signal: Mutex<CapacitySignal>,
}

#[async_trait]
impl CapacitySource for SettableSource {
    async fn sample(&self, _tenant: Option<&TenantId>) -> CapacitySignal {
        *self.signal.lock()
    }
}

struct NoopExecutor;

#[async_trait]
impl ScalingExecutor for NoopExecutor {
    async fn apply(
        &self,
        _action: ScalingAction,
        _from: u32,
        _to: u32,
    ) -> Result<(), String> {
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn instances_stay_within_bounds(
        min in 1u32..3,
        span in 0u32..4,
        initial in 1u32..8,
        loads in proptest::collection::vec(0u32..20, 1..15),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let max = min + span;
            let mut policy = ScalingPolicy::default();
            policy.min_instances = min;
            policy.max_instances = max;
            // Zero cooldowns so every step can act; bounds must hold anyway
            policy.scale_up_cooldown_seconds = 0;
            policy.scale_down_cooldown_seconds = 0;

            let source = Arc::new(SettableSource {
                signal: Mutex::new(CapacitySignal {
                    concurrent_calls: 0,
                    nominal_capacity: 10,
                    cpu_percent: 10.0,
                    memory_percent: 10.0,
                }),
            });
            let scaler = AutoScaler::new(source.clone(), policy, initial).unwrap();
            scaler.add_executor(Arc::new(NoopExecutor));

            prop_assert!(scaler.current_instances() >= min);
            prop_assert!(scaler.current_instances() <= max);

            for load in loads {
                source.signal.lock().concurrent_calls = load;
                scaler.force_evaluation(None).await;
                let current = scaler.current_instances();
                prop_assert!(current >= min, "current {} below min {}", current, min);
                prop_assert!(current <= max, "current {} above max {}", current, max);
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn scale_ups_respect_cooldown_spacing() {
    let source = Arc::new(SettableSource {
        signal: Mutex::new(CapacitySignal {
            concurrent_calls: 10,
            nominal_capacity: 10,
            cpu_percent: 10.0,
            memory_percent: 10.0,
        }),
    });
    let mut policy = ScalingPolicy::default();
    policy.max_instances = 10;
    policy.scale_up_cooldown_seconds = 3600;
    let scaler = AutoScaler::new(source, policy, 1).unwrap();
    scaler.add_executor(Arc::new(NoopExecutor));

    let first = scaler.force_evaluation(None).await;
    assert_eq!(first.action, ScalingAction::ScaleUp);

    // Any number of immediate re-evaluations inside the cooldown maintain
    for _ in 0..5 {
        let event = scaler.force_evaluation(None).await;
        assert_eq!(event.action, ScalingAction::Maintain);
    }
    assert_eq!(scaler.current_instances(), 2);

    let ups = scaler
        .history()
        .iter()
        .filter(|e| e.action == ScalingAction::ScaleUp)
        .count();
    assert_eq!(ups, 1);
}
