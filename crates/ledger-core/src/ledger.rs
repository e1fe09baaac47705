//! Credit ledger implementation
//!
//! Accounts are tenant-scoped. Each account holds an append-only
//! transaction list and the materialized usage fold; both are mutated under
//! one short per-tenant lock so `check_budget` stays linearizable with
//! `debit` and debits for a tenant are serialized.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use voicedesk_infra_common::{CallId, TenantId};

use crate::error::{LedgerError, Result};

/// Default fraction of the monthly limit at which `check_budget` starts
/// answering `Warn`.
pub const DEFAULT_WARNING_RATIO: f64 = 0.9;

/// Answer to "may this tenant consume N more seconds?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    Ok,
    /// Within the warning threshold of the limit
    Warn,
    /// Would exceed the monthly limit
    Deny,
}

/// What a debit call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// The debit was applied; the tenant's new usage is returned
    Committed { new_usage: i64 },
    /// A debit with this call id was already applied; nothing changed
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
    CycleReset,
}

/// One signed adjustment in a tenant's ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub sequence: u64,
    pub kind: TransactionKind,
    /// Signed seconds: debits positive, credits and resets negative
    pub amount_seconds: i64,
    pub reason: String,
    pub call_id: Option<CallId>,
    /// Billing-cycle label the transaction belongs to
    pub cycle: String,
    pub recorded_at: DateTime<Utc>,
}

struct TenantAccount {
    monthly_limit_seconds: i64,
    active: bool,
    /// Day of month the billing cycle rolls over
    anchor_day: u32,
    usage_seconds: i64,
    transactions: Vec<CreditTransaction>,
    applied_calls: HashSet<CallId>,
    current_cycle: String,
}

impl TenantAccount {
    fn push(&mut self, kind: TransactionKind, amount: i64, reason: String, call_id: Option<CallId>) {
        let tx = CreditTransaction {
            sequence: self.transactions.len() as u64,
            kind,
            amount_seconds: amount,
            reason,
            call_id,
            cycle: self.current_cycle.clone(),
            recorded_at: Utc::now(),
        };
        self.usage_seconds += amount;
        self.transactions.push(tx);
    }
}

/// Per-tenant credit/quota ledger.
pub struct CreditLedger {
    accounts: DashMap<TenantId, Mutex<TenantAccount>>,
    warning_ratio: f64,
}

impl CreditLedger {
    pub fn new() -> Self {
        CreditLedger {
            accounts: DashMap::new(),
            warning_ratio: DEFAULT_WARNING_RATIO,
        }
    }

    pub fn with_warning_ratio(mut self, ratio: f64) -> Self {
        self.warning_ratio = ratio;
        self
    }

    /// Create or update a tenant account. Usage and history survive a
    /// reconfiguration; only the limit and anchor day change.
    pub fn configure_tenant(&self, tenant: &TenantId, monthly_limit_seconds: i64, anchor_day: u32) {
        match self.accounts.get(tenant) {
            Some(existing) => {
                let mut account = existing.lock();
                account.monthly_limit_seconds = monthly_limit_seconds;
                account.anchor_day = anchor_day.clamp(1, 28);
            }
            None => {
                self.accounts.insert(
                    tenant.clone(),
                    Mutex::new(TenantAccount {
                        monthly_limit_seconds,
                        active: true,
                        anchor_day: anchor_day.clamp(1, 28),
                        usage_seconds: 0,
                        transactions: Vec::new(),
                        applied_calls: HashSet::new(),
                        current_cycle: cycle_label(Utc::now(), anchor_day.clamp(1, 28)),
                    }),
                );
            }
        }
        debug!(tenant = %tenant, limit = monthly_limit_seconds, "ledger account configured");
    }

    /// Activate or deactivate a tenant account. Deactivated accounts refuse
    /// debits; active sessions handle that refusal as best-effort billing.
    pub fn set_active(&self, tenant: &TenantId, active: bool) -> Result<()> {
        let entry = self.account(tenant)?;
        entry.lock().active = active;
        Ok(())
    }

    /// Pure read, linearizable with `debit`: both take the account lock.
    pub fn check_budget(&self, tenant: &TenantId, seconds: i64) -> BudgetDecision {
        let Some(entry) = self.accounts.get(tenant) else {
            return BudgetDecision::Deny;
        };
        let mut account = entry.lock();
        self.roll_cycle_locked(tenant, &mut account, Utc::now());
        if !account.active {
            return BudgetDecision::Deny;
        }
        let projected = account.usage_seconds + seconds;
        if projected > account.monthly_limit_seconds {
            BudgetDecision::Deny
        } else if (projected as f64) >= self.warning_ratio * account.monthly_limit_seconds as f64 {
            BudgetDecision::Warn
        } else {
            BudgetDecision::Ok
        }
    }

    /// Remaining seconds in the tenant's budget, zero-floored.
    pub fn remaining(&self, tenant: &TenantId) -> i64 {
        self.accounts
            .get(tenant)
            .map(|entry| {
                let account = entry.lock();
                (account.monthly_limit_seconds - account.usage_seconds).max(0)
            })
            .unwrap_or(0)
    }

    /// Atomic compare-and-increment under budget, idempotent by call id.
    pub fn debit(&self, tenant: &TenantId, seconds: i64, call_id: &CallId) -> Result<DebitOutcome> {
        if seconds <= 0 {
            return Err(LedgerError::InvalidAmount { amount: seconds });
        }
        let entry = self.account(tenant)?;
        let mut account = entry.lock();
        self.roll_cycle_locked(tenant, &mut account, Utc::now());

        if account.applied_calls.contains(call_id) {
            debug!(tenant = %tenant, call = %call_id, "duplicate debit ignored");
            return Ok(DebitOutcome::AlreadyApplied);
        }
        if !account.active {
            return Err(LedgerError::TenantInactive {
                tenant: tenant.to_string(),
            });
        }
        if account.usage_seconds + seconds > account.monthly_limit_seconds {
            return Err(LedgerError::QuotaExhausted {
                tenant: tenant.to_string(),
                usage: account.usage_seconds,
                requested: seconds,
                limit: account.monthly_limit_seconds,
            });
        }

        account.applied_calls.insert(call_id.clone());
        account.push(
            TransactionKind::Debit,
            seconds,
            "call_minutes".to_string(),
            Some(call_id.clone()),
        );
        Ok(DebitOutcome::Committed {
            new_usage: account.usage_seconds,
        })
    }

    /// Record a top-up or refund. Always succeeds for a known tenant and
    /// never debits.
    pub fn credit(&self, tenant: &TenantId, seconds: i64, reason: impl Into<String>) -> Result<()> {
        if seconds <= 0 {
            return Err(LedgerError::InvalidAmount { amount: seconds });
        }
        let entry = self.account(tenant)?;
        let mut account = entry.lock();
        account.push(TransactionKind::Credit, -seconds, reason.into(), None);
        Ok(())
    }

    /// Current usage fold for a tenant
    pub fn current_usage(&self, tenant: &TenantId) -> i64 {
        self.accounts
            .get(tenant)
            .map(|entry| entry.lock().usage_seconds)
            .unwrap_or(0)
    }

    /// Snapshot of a tenant's transaction history
    pub fn transactions(&self, tenant: &TenantId) -> Vec<CreditTransaction> {
        self.accounts
            .get(tenant)
            .map(|entry| entry.lock().transactions.clone())
            .unwrap_or_default()
    }

    /// Roll every account whose billing cycle has lapsed. Intended for a
    /// periodic maintenance tick; individual operations also roll lazily so
    /// correctness does not depend on the tick.
    pub fn run_cycle_resets(&self, now: DateTime<Utc>) {
        for entry in self.accounts.iter() {
            let tenant = entry.key().clone();
            let mut account = entry.value().lock();
            self.roll_cycle_locked(&tenant, &mut account, now);
        }
    }

    /// Drop a tenant's account entirely. Used by tenant hard-deletion.
    pub fn purge_tenant(&self, tenant: &TenantId) {
        self.accounts.remove(tenant);
    }

    fn account(
        &self,
        tenant: &TenantId,
    ) -> Result<dashmap::mapref::one::Ref<'_, TenantId, Mutex<TenantAccount>>> {
        self.accounts
            .get(tenant)
            .ok_or_else(|| LedgerError::UnknownTenant {
                tenant: tenant.to_string(),
            })
    }

    /// Reset usage by writing a synthetic negative transaction when the
    /// cycle label changes. The label comparison makes the reset exactly
    /// once per cycle per tenant no matter how many callers race here.
    fn roll_cycle_locked(&self, tenant: &TenantId, account: &mut TenantAccount, now: DateTime<Utc>) {
        let label = cycle_label(now, account.anchor_day);
        if label == account.current_cycle {
            return;
        }
        let carried = account.usage_seconds;
        if carried != 0 {
            account.push(
                TransactionKind::CycleReset,
                -carried,
                format!("cycle_reset:{}", account.current_cycle),
                None,
            );
        }
        info!(tenant = %tenant, from = %account.current_cycle, to = %label,
              carried, "billing cycle rolled");
        account.current_cycle = label;
        account.applied_calls.clear();
        if account.usage_seconds != 0 {
            // The fold must be zero after a reset by construction.
            warn!(tenant = %tenant, residue = account.usage_seconds,
                  "cycle reset left non-zero usage");
        }
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Billing-cycle label for an instant given the tenant's anchor day.
/// The cycle that starts on `anchor_day` of month M is labelled "M".
fn cycle_label(now: DateTime<Utc>, anchor_day: u32) -> String {
    let (year, month) = if now.day() >= anchor_day {
        (now.year(), now.month())
    } else if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    };
    format!("{:04}-{:02}", year, month)
}
