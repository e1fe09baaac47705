//! Scaling policy configuration

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScalingError};

/// Per-tenant (or default) autoscaling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub name: String,
    pub enabled: bool,
    pub min_instances: u32,
    pub max_instances: u32,
    pub target_utilization: f64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_up_cooldown_seconds: i64,
    pub scale_down_cooldown_seconds: i64,
    pub scale_up_increment: u32,
    pub scale_down_decrement: u32,
    pub evaluation_period_seconds: u64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        ScalingPolicy {
            name: "default".to_string(),
            enabled: true,
            min_instances: 1,
            max_instances: 10,
            target_utilization: 0.65,
            scale_up_threshold: 0.75,
            scale_down_threshold: 0.30,
            scale_up_cooldown_seconds: 300,
            scale_down_cooldown_seconds: 600,
            scale_up_increment: 1,
            scale_down_decrement: 1,
            evaluation_period_seconds: 60,
        }
    }
}

impl ScalingPolicy {
    /// Validate the structural invariants: `min <= max` and
    /// `scale_down_threshold < scale_up_threshold`.
    pub fn validate(&self) -> Result<()> {
        if self.min_instances == 0 {
            return Err(ScalingError::InvalidPolicy {
                detail: "min_instances must be >= 1".to_string(),
            });
        }
        if self.min_instances > self.max_instances {
            return Err(ScalingError::InvalidPolicy {
                detail: format!(
                    "min_instances {} > max_instances {}",
                    self.min_instances, self.max_instances
                ),
            });
        }
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(ScalingError::InvalidPolicy {
                detail: format!(
                    "scale_down_threshold {} must be below scale_up_threshold {}",
                    self.scale_down_threshold, self.scale_up_threshold
                ),
            });
        }
        if self.scale_up_increment == 0 || self.scale_down_decrement == 0 {
            return Err(ScalingError::InvalidPolicy {
                detail: "scaling steps must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}
