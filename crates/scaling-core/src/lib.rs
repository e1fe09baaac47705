//! # VoiceDesk Scaling Core
//!
//! Closed-loop autoscaling: utilization telemetry in, instance-count
//! changes out. The controller keeps utilization inside the policy's
//! `[scale_down_threshold, scale_up_threshold]` band without oscillating,
//! using directional cooldowns that are independent of each other — a
//! failed or successful scale-up never blocks a later scale-down.
//!
//! The controller does not know how instances are made; registered
//! [`ScalingExecutor`] callbacks effect the change in whatever
//! orchestration substrate is in use. A callback failure still arms the
//! cooldown so a broken substrate is not hammered with retries.

pub mod controller;
pub mod error;
pub mod policy;
pub mod telemetry;

pub use controller::{AutoScaler, Recommendation, ScalingAction, ScalingEvent, ScalingExecutor};
pub use error::{Result, ScalingError};
pub use policy::ScalingPolicy;
pub use telemetry::{CapacitySignal, CapacitySource};
