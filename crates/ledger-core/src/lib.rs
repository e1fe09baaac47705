//! # VoiceDesk Ledger Core
//!
//! Per-tenant credit and quota accounting. Answers two questions for the
//! rest of the stack, atomically: "may this tenant consume N more seconds?"
//! and "record that it consumed N seconds".
//!
//! The ledger is a per-tenant append-only transaction list plus a
//! materialized usage fold. The invariant `sum(transactions) ==
//! current_usage` holds at all times; debits are idempotent by call id so
//! the orchestrator can safely retry a terminal commit.
//!
//! ## Quick Start
//!
//! ```
//! use voicedesk_ledger_core::{BudgetDecision, CreditLedger};
//! use voicedesk_infra_common::{CallId, TenantId};
//!
//! let ledger = CreditLedger::new();
//! let tenant = TenantId::from("tenant-acme");
//! ledger.configure_tenant(&tenant, 600, 1);
//!
//! assert_eq!(ledger.check_budget(&tenant, 60), BudgetDecision::Ok);
//! ledger.debit(&tenant, 60, &CallId::from("call-1")).unwrap();
//! assert_eq!(ledger.current_usage(&tenant), 60);
//! ```

pub mod error;
pub mod ledger;

pub use error::{LedgerError, Result};
pub use ledger::{BudgetDecision, CreditLedger, CreditTransaction, DebitOutcome, TransactionKind};
