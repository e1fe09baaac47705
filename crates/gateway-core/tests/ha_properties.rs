//! Property tests for gateway eligibility
//!
//! While at least one endpoint is eligible, no selection may land on an
//! endpoint whose circuit is open.

use proptest::prelude::*;
use voicedesk_gateway_core::{
    BalancingPolicy, CircuitState, EndpointStatus, HaGateway, ServiceEndpoint,
};
use voicedesk_infra_common::EndpointId;

fn build_pool(unhealthy_mask: &[bool]) -> HaGateway {
    let gateway = HaGateway::new(BalancingPolicy::WeightedRoundRobin);
    for (i, _) in unhealthy_mask.iter().enumerate() {
        gateway
            .add_endpoint(
                ServiceEndpoint::new(
                    EndpointId::from(format!("endpoint-{}", i)),
                    format!("endpoint-{}", i),
                    format!("http://endpoint-{}.internal", i),
                )
                .with_priority(i as u32 + 1),
            )
            .unwrap();
    }
    for (i, broken) in unhealthy_mask.iter().enumerate() {
        let id = EndpointId::from(format!("endpoint-{}", i));
        gateway.apply_health(&id, EndpointStatus::Healthy);
        if *broken {
            // Drive the circuit open with consecutive failures
            for _ in 0..5 {
                gateway.record_request_start(&id);
                gateway.record_request_failure(&id);
            }
        }
    }
    gateway
}

proptest! {
    #[test]
    fn open_circuits_never_receive_requests(
        mask in proptest::collection::vec(any::<bool>(), 2..6),
        picks in 1usize..30,
    ) {
        prop_assume!(mask.iter().any(|b| !b));
        let gateway = build_pool(&mask);

        let open: Vec<String> = gateway
            .snapshots()
            .iter()
            .filter(|s| s.circuit == CircuitState::Open)
            .map(|s| s.endpoint.id.to_string())
            .collect();

        for _ in 0..picks {
            let chosen = gateway.select_endpoint().unwrap();
            prop_assert!(!open.contains(&chosen.id.to_string()),
                         "open endpoint {} was selected", chosen.id);
        }
    }

    #[test]
    fn active_endpoint_is_always_eligible_when_one_exists(
        mask in proptest::collection::vec(any::<bool>(), 2..6),
    ) {
        prop_assume!(mask.iter().any(|b| !b));
        let gateway = build_pool(&mask);
        let active = gateway.active_endpoint().expect("an eligible endpoint exists");
        prop_assert!(active.is_eligible());
    }
}

#[test]
fn half_open_trial_is_exclusive_until_it_resolves() {
    let gateway = HaGateway::new(BalancingPolicy::LeastConnections);
    for i in 0u32..2 {
        gateway
            .add_endpoint(
                ServiceEndpoint::new(
                    EndpointId::from(format!("endpoint-{}", i)),
                    format!("endpoint-{}", i),
                    format!("http://endpoint-{}.internal", i),
                )
                .with_priority(i + 1),
            )
            .unwrap();
    }
    let e0 = EndpointId::from("endpoint-0");
    let e1 = EndpointId::from("endpoint-1");
    gateway.apply_health(&e0, EndpointStatus::Healthy);
    gateway.apply_health(&e1, EndpointStatus::Healthy);

    for _ in 0..5 {
        gateway.record_request_start(&e0);
        gateway.record_request_failure(&e0);
    }
    gateway.advance_circuits(chrono::Utc::now() + chrono::Duration::seconds(61));
    assert_eq!(gateway.snapshot(&e0).unwrap().circuit, CircuitState::HalfOpen);

    // Exactly one selection may route to the half-open endpoint before
    // its trial resolves
    let mut hits = 0;
    for _ in 0..10 {
        if gateway.select_endpoint().unwrap().id == e0 {
            hits += 1;
        }
    }
    assert_eq!(hits, 1);
}

#[test]
fn all_broken_pool_still_selects_with_fallback() {
    let gateway = build_pool(&[true, true]);
    // Nothing eligible: selection falls back to the full pool rather than
    // refusing outright.
    let chosen = gateway.select_endpoint().unwrap();
    assert!(chosen.id.to_string().starts_with("endpoint-"));
}
