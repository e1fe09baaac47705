//! # VoiceDesk Callback Core
//!
//! Persistent-shaped, priority-ordered return-call queue. Callers who would
//! rather not wait leave a callback request; a background worker executes
//! attempts when they come due, inside business hours, with bounded retry.
//!
//! ## Lifecycle
//!
//! ```text
//!            create                     claim (CAS)
//!  pending ──────────► scheduled ────────────────────► in_progress
//!     ▲                                                     │
//!     │          no_answer / busy / failed (retries left)   │
//!     └─────────────────────────────────────────────────────┤
//!                                                           │
//!                   connected + resolved ──► completed      │
//!                   retries exhausted    ──► failed         │
//!                                                           ▼
//!            cancelled / expired are sinks from any non-terminal state
//! ```
//!
//! Only one attempt per request may be in flight: the worker claims a
//! request with a compare-and-set on `(id, status)` before touching it, so
//! multiple workers can run against one store.

pub mod error;
pub mod schedule;
pub mod store;
pub mod types;
pub mod worker;

pub use error::{CallbackError, Result};
pub use schedule::CallbackSchedule;
pub use store::{CallbackDraft, CallbackStore, DueQuery};
pub use types::{
    backoff_delay, AttemptOutcome, CallbackAttempt, CallbackPriority, CallbackRequest,
    CallbackStatus, CallbackType,
};
pub use worker::{AttemptReport, CallbackDispatcher, CallbackWorker, DispatchError};
