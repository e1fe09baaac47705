//! Capacity telemetry
//!
//! The controller consumes a [`CapacitySignal`] per evaluation. Effective
//! capacity is nominal capacity reduced under host stress: a saturated
//! host cannot actually serve its nominal concurrency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use voicedesk_infra_common::TenantId;

/// One sample of aggregate utilization telemetry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CapacitySignal {
    /// Calls currently in flight
    pub concurrent_calls: u32,
    /// Nominal concurrent-call capacity across all instances
    pub nominal_capacity: u32,
    /// Host CPU utilization, 0-100
    pub cpu_percent: f64,
    /// Host memory utilization, 0-100
    pub memory_percent: f64,
}

impl CapacitySignal {
    /// Stress reduction factor: 0.8 past 80 % CPU or memory, 0.9 past
    /// 60 %, else 1.0.
    pub fn stress_factor(&self) -> f64 {
        let peak = self.cpu_percent.max(self.memory_percent);
        if peak > 80.0 {
            0.8
        } else if peak > 60.0 {
            0.9
        } else {
            1.0
        }
    }

    /// Nominal capacity scaled down by the stress factor
    pub fn effective_capacity(&self) -> f64 {
        self.nominal_capacity as f64 * self.stress_factor()
    }

    /// Utilization in [0, ∞); zero capacity reads as fully utilized so a
    /// misconfigured pool scales up rather than flapping.
    pub fn utilization(&self) -> f64 {
        let capacity = self.effective_capacity();
        if capacity <= 0.0 {
            if self.concurrent_calls > 0 {
                1.0
            } else {
                0.0
            }
        } else {
            self.concurrent_calls as f64 / capacity
        }
    }
}

/// Source of capacity telemetry, optionally tenant-scoped.
#[async_trait]
pub trait CapacitySource: Send + Sync {
    async fn sample(&self, tenant: Option<&TenantId>) -> CapacitySignal;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(calls: u32, capacity: u32, cpu: f64, memory: f64) -> CapacitySignal {
        CapacitySignal {
            concurrent_calls: calls,
            nominal_capacity: capacity,
            cpu_percent: cpu,
            memory_percent: memory,
        }
    }

    #[test]
    fn stress_factor_tiers() {
        assert_eq!(signal(0, 10, 50.0, 50.0).stress_factor(), 1.0);
        assert_eq!(signal(0, 10, 65.0, 10.0).stress_factor(), 0.9);
        assert_eq!(signal(0, 10, 10.0, 85.0).stress_factor(), 0.8);
    }

    #[test]
    fn utilization_reflects_effective_capacity() {
        // 8 calls on 10 nominal at 0.8 stress -> 8 / 8 = 1.0
        let s = signal(8, 10, 90.0, 10.0);
        assert!((s.utilization() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_capacity_with_load_reads_saturated() {
        assert_eq!(signal(3, 0, 0.0, 0.0).utilization(), 1.0);
        assert_eq!(signal(0, 0, 0.0, 0.0).utilization(), 0.0);
    }
}
