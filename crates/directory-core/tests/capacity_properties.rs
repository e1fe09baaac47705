//! Property tests for the agent-capacity invariant
//!
//! `0 <= current_calls <= capacity` must hold for every agent at all
//! times, including under concurrent reserve/release pressure.

use std::sync::Arc;

use proptest::prelude::*;
use voicedesk_directory_core::{Agent, AgentRegistry, AgentStatus};
use voicedesk_infra_common::{AgentId, TenantId};

fn available_agent(id: &str, capacity: u32) -> Agent {
    let mut agent = Agent::new(
        AgentId::from(id),
        TenantId::from("tenant-prop"),
        id.to_string(),
        format!("ext-{}", id),
    );
    agent.status = AgentStatus::Available;
    agent.capacity = capacity;
    agent
}

proptest! {
    #[test]
    fn interleaved_reserve_release_respects_capacity(
        capacity in 1u32..4,
        ops in proptest::collection::vec(any::<bool>(), 0..60),
    ) {
        let registry = AgentRegistry::new();
        let tenant = TenantId::from("tenant-prop");
        let id = AgentId::from("agent-1");
        registry.upsert_agent(available_agent("agent-1", capacity)).unwrap();

        for reserve in ops {
            if reserve {
                let _ = registry.reserve(&tenant, &id);
            } else {
                let _ = registry.release(&tenant, &id);
            }
            let agent = registry.get_agent(&tenant, &id).unwrap();
            prop_assert!(agent.current_calls <= agent.capacity,
                         "calls {} > capacity {}", agent.current_calls, agent.capacity);
        }
    }

    #[test]
    fn successful_reserves_never_exceed_capacity(capacity in 1u32..5, tries in 1usize..20) {
        let registry = AgentRegistry::new();
        let tenant = TenantId::from("tenant-prop");
        let id = AgentId::from("agent-1");
        registry.upsert_agent(available_agent("agent-1", capacity)).unwrap();

        let mut granted = 0u32;
        for _ in 0..tries {
            if registry.reserve(&tenant, &id).is_ok() {
                granted += 1;
            }
        }
        prop_assert!(granted <= capacity);
        let agent = registry.get_agent(&tenant, &id).unwrap();
        prop_assert_eq!(agent.current_calls, granted.min(capacity));
    }
}

#[tokio::test]
async fn concurrent_reserve_release_keeps_the_invariant() {
    let registry = Arc::new(AgentRegistry::new());
    let tenant = TenantId::from("tenant-prop");
    let id = AgentId::from("agent-1");
    registry.upsert_agent(available_agent("agent-1", 2)).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let tenant = tenant.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                if registry.reserve(&tenant, &id).is_ok() {
                    tokio::task::yield_now().await;
                    registry.release(&tenant, &id).unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let agent = registry.get_agent(&tenant, &id).unwrap();
    assert_eq!(agent.current_calls, 0);
    assert_eq!(agent.status, AgentStatus::Available);
}
