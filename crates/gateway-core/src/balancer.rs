//! Endpoint selection policies
//!
//! Three fixed policies chosen at startup from configuration. All operate
//! on snapshots; the gateway owns the cursor and the bookkeeping they read.

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingPolicy {
    RoundRobin,
    /// Default: pick the endpoint whose observed share of traffic is
    /// furthest below its weight-share target
    WeightedRoundRobin,
    LeastConnections,
}

impl Default for BalancingPolicy {
    fn default() -> Self {
        BalancingPolicy::WeightedRoundRobin
    }
}

/// Select one endpoint from a non-empty pool under the given policy.
pub(crate) fn pick<'a>(
    policy: BalancingPolicy,
    pool: &[&'a EndpointSnapshot],
    cursor: usize,
) -> &'a EndpointSnapshot {
    debug_assert!(!pool.is_empty());
    match policy {
        BalancingPolicy::RoundRobin => pool[cursor % pool.len()],
        BalancingPolicy::WeightedRoundRobin => weighted_pick(pool),
        BalancingPolicy::LeastConnections => pool
            .iter()
            .copied()
            .min_by_key(|s| s.outstanding_requests)
            .expect("non-empty pool"),
    }
}

/// Deficit-based weighted selection: the endpoint lagging its target share
/// the most gets the next request.
fn weighted_pick<'a>(pool: &[&'a EndpointSnapshot]) -> &'a EndpointSnapshot {
    let total_weight: u64 = pool.iter().map(|s| s.endpoint.weight as u64).sum();
    let total_requests: u64 = pool.iter().map(|s| s.total_requests).sum();
    if total_weight == 0 || total_requests == 0 {
        return pool[0];
    }

    let mut best = pool[0];
    let mut best_deficit = f64::MIN;
    for snapshot in pool.iter().copied() {
        let expected = snapshot.endpoint.weight as f64 / total_weight as f64;
        let actual = snapshot.total_requests as f64 / total_requests as f64;
        let deficit = expected - actual;
        if deficit > best_deficit {
            best_deficit = deficit;
            best = snapshot;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{CircuitState, EndpointStatus, ServiceEndpoint};
    use voicedesk_infra_common::EndpointId;

    fn snapshot(id: &str, weight: u32, total: u64, outstanding: u32) -> EndpointSnapshot {
        EndpointSnapshot {
            endpoint: ServiceEndpoint::new(
                EndpointId::from(id),
                id.to_string(),
                format!("http://{}", id),
            )
            .with_weight(weight),
            status: EndpointStatus::Healthy,
            circuit: CircuitState::Closed,
            consecutive_failures: 0,
            next_attempt_at: None,
            trial_in_flight: false,
            outstanding_requests: outstanding,
            total_requests: total,
        }
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let a = snapshot("endpoint-a", 1, 0, 0);
        let b = snapshot("endpoint-b", 1, 0, 0);
        let pool = vec![&a, &b];
        assert_eq!(pick(BalancingPolicy::RoundRobin, &pool, 0).endpoint.id, a.endpoint.id);
        assert_eq!(pick(BalancingPolicy::RoundRobin, &pool, 1).endpoint.id, b.endpoint.id);
        assert_eq!(pick(BalancingPolicy::RoundRobin, &pool, 2).endpoint.id, a.endpoint.id);
    }

    #[test]
    fn weighted_pick_feeds_the_starved_endpoint() {
        // endpoint-a should carry 2/3 of traffic but has carried 1/2
        let a = snapshot("endpoint-a", 100, 5, 0);
        let b = snapshot("endpoint-b", 50, 5, 0);
        let pool = vec![&a, &b];
        let chosen = pick(BalancingPolicy::WeightedRoundRobin, &pool, 0);
        assert_eq!(chosen.endpoint.id, a.endpoint.id);
    }

    #[test]
    fn weighted_pick_respects_target_once_reached() {
        // endpoint-a already has its 2/3 share; endpoint-b is starved
        let a = snapshot("endpoint-a", 100, 8, 0);
        let b = snapshot("endpoint-b", 50, 1, 0);
        let pool = vec![&a, &b];
        let chosen = pick(BalancingPolicy::WeightedRoundRobin, &pool, 0);
        assert_eq!(chosen.endpoint.id, b.endpoint.id);
    }

    #[test]
    fn least_connections_picks_the_idle_endpoint() {
        let a = snapshot("endpoint-a", 1, 0, 4);
        let b = snapshot("endpoint-b", 1, 0, 1);
        let pool = vec![&a, &b];
        let chosen = pick(BalancingPolicy::LeastConnections, &pool, 0);
        assert_eq!(chosen.endpoint.id, b.endpoint.id);
    }
}
