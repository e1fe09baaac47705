//! # VoiceDesk
//!
//! Umbrella crate for the voicedesk platform: a multitenant, AI-assisted
//! virtual receptionist with human escalation, callbacks, autoscaling,
//! and a high-availability outbound gateway.
//!
//! Each subsystem lives in its own crate; this crate re-exports them
//! under one namespace so applications depend on a single entry point.
//!
//! ```no_run
//! use voicedesk::call_engine::prelude::*;
//! use voicedesk::infra::Settings;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut server = VoiceDeskServerBuilder::new()
//!     .with_settings(Settings::from_env())
//!     .build()?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

/// Shared infrastructure: ids, logging, schedules, settings
pub use voicedesk_infra_common as infra;

/// Privacy-compliant audit log and caller fingerprints
pub use voicedesk_audit_core as audit;

/// Per-tenant credit/quota ledger
pub use voicedesk_ledger_core as ledger;

/// Tenant, department, and agent directory with routing
pub use voicedesk_directory_core as directory;

/// Priority-ordered callback scheduling
pub use voicedesk_callback_core as callbacks;

/// Health-checked outbound endpoint pool
pub use voicedesk_gateway_core as gateway;

/// Closed-loop autoscaling controller
pub use voicedesk_scaling_core as scaling;

/// Call session orchestration and the admin surface
pub use voicedesk_call_engine as call_engine;
