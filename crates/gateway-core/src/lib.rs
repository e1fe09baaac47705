//! # VoiceDesk Gateway Core
//!
//! High-availability outbound gateway: every request the platform makes to
//! an external service (AI provider, carrier API) goes through a pool of
//! redundant endpoints with health checks, circuit breakers, weighted load
//! balancing, and automatic failover.
//!
//! ## Request path
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   request ────► │  select: eligible endpoints  │
//!                 │  (healthy|degraded, circuit  │
//!                 │   not open) via policy       │
//!                 └──────────────┬───────────────┘
//!                                │ none eligible? fall back to the
//!                                │ whole pool and raise a critical alert
//!                 ┌──────────────▼───────────────┐
//!                 │  execute with per-endpoint   │
//!                 │  deadline; on failure, fail  │
//!                 │  over to the next endpoint   │
//!                 └──────────────┬───────────────┘
//!                                │ outcomes feed the circuit breaker
//!                 ┌──────────────▼───────────────┐
//!                 │  health checker (30 s tick)  │
//!                 │  probes every endpoint and   │
//!                 │  advances open → half-open   │
//!                 └──────────────────────────────┘
//! ```
//!
//! The prober is a capability trait so tests drive the pool with scripted
//! results instead of sockets.

pub mod balancer;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod health;

pub use balancer::BalancingPolicy;
pub use endpoint::{
    CircuitState, EndpointSnapshot, EndpointStatus, FailoverEvent, ServiceEndpoint,
};
pub use error::{GatewayError, Result};
pub use gateway::{HaGateway, LoadBalancerStats};
pub use health::{HealthChecker, HealthProbe, HttpHealthProbe, ProbeResult};
