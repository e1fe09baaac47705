//! # VoiceDesk Infrastructure Common
//!
//! Shared infrastructure for the voicedesk stack. This crate carries the
//! pieces every other crate leans on but none owns: logging bootstrap,
//! strongly typed identifiers, the business-hours schedule predicate, and
//! the process-wide settings loader.
//!
//! Nothing in here knows about calls, agents, or tenant policy — those live
//! in the subsystem crates. Keeping this layer thin is what lets the
//! subsystem crates depend on it without dependency cycles.

pub mod hours;
pub mod ids;
pub mod logging;
pub mod settings;

pub use hours::BusinessHours;
pub use ids::{
    AgentId, AttemptId, CallId, CallbackId, CorrelationId, DepartmentId, EndpointId, SessionId,
    TenantId,
};
pub use logging::{setup_logging, LoggingConfig};
pub use settings::Settings;
