//! # VoiceDesk Call Engine
//!
//! Per-call orchestration for the voicedesk platform: the session state
//! machine, the AI turn loop, carrier webhook handling, routing glue over
//! the agent directory, admission control against the credit ledger, and
//! the administrative HTTP surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              VoiceDeskServer                 │
//! ├──────────────────────────────────────────────┤
//! │   Admin API │ Carrier webhook │ Workers      │
//! ├──────────────────────────────────────────────┤
//! │              VoiceDeskEngine                 │
//! │  session tasks · command processor · offers  │
//! ├──────────────┬───────────┬───────────────────┤
//! │ directory    │ ledger    │ callback store    │
//! │ routing      │ audit     │ HA gateway        │
//! └──────────────┴───────────┴───────────────────┘
//! ```
//!
//! Every call is one task with one mailbox. The state machine's
//! transition function is pure; the engine executes the commands it emits
//! and feeds external events (carrier, AI provider, agent answers) back
//! into the owning mailbox. See [`session`] for the machine itself.
//!
//! ## Quick Start
//!
//! ```no_run
//! use voicedesk_call_engine::prelude::*;
//! use voicedesk_infra_common::Settings;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut server = VoiceDeskServerBuilder::new()
//!     .with_settings(Settings::from_env())
//!     .build()?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod ai;
pub mod api;
pub mod carrier;
pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod server;
pub mod session;
pub mod spam;
pub mod translation;
pub mod voicemail;

pub use config::EngineConfig;
pub use engine::{EngineStats, VoiceDeskEngine};
pub use error::{EngineError, Result};
pub use server::{VoiceDeskServer, VoiceDeskServerBuilder};
