//! # VoiceDesk Directory Core
//!
//! Authoritative state for tenants, departments, and agents, plus the
//! routing policy that answers "which agent, if any, should take this
//! call?".
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                 TenantDirectory                    │
//! │  tenants · departments · routing defaults · flags  │
//! └───────────────────────┬────────────────────────────┘
//!                         │ ids only, no pointers
//! ┌───────────────────────▼────────────────────────────┐
//! │                  AgentRegistry                     │
//! │  status · capacity · skills · schedules · weights  │
//! └───────────────────────┬────────────────────────────┘
//!                         │ immutable snapshots
//! ┌───────────────────────▼────────────────────────────┐
//! │                  RoutingEngine                     │
//! │  pure selection policy + transfer attempt machine  │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! The registry owns all mutation; routing reads snapshots and performs a
//! `reserve` compare-and-set to claim its pick, retrying when a concurrent
//! selection wins the race. Entity references are ids, never pointers —
//! the directory is the single source of truth and callers resolve on
//! demand.

pub mod error;
pub mod registry;
pub mod routing;
pub mod tenants;
pub mod types;

pub use error::{DirectoryError, Result};
pub use registry::AgentRegistry;
pub use routing::{
    select_agent, OfferOutcome, RoutingCriteria, RoutingEngine, TransferAttempt, TransferTracker,
};
pub use tenants::TenantDirectory;
pub use types::{Agent, AgentStatus, Department, FallbackTarget, Tenant};
