//! # Call Session Orchestration
//!
//! One task per call, one mailbox per task. The state machine's transition
//! function ([`transitions::transition`]) is pure; the task applies it,
//! enforces per-state wall-clock timeouts, accrues the charge accumulator,
//! and commits the terminal debit together with the session-close audit
//! record. Commands flow out to the engine over a channel and side effects
//! happen there.

pub mod task;
pub mod transitions;
pub mod types;

pub use task::{spawn_session, SessionCommand, SessionHandle, SessionSnapshot};
pub use transitions::transition;
pub use types::{
    Command, ConversationTurn, SessionContext, SessionEvent, SessionState, Speaker,
    TerminationOutcome, Transition,
};
