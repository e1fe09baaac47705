//! Error types for ledger-core

use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// The tenant has no ledger account
    #[error("unknown tenant: {tenant}")]
    UnknownTenant { tenant: String },

    /// The debit would push usage past the monthly limit
    #[error("quota exhausted for tenant {tenant}: usage {usage}s + {requested}s > limit {limit}s")]
    QuotaExhausted {
        tenant: String,
        usage: i64,
        requested: i64,
        limit: i64,
    },

    /// The tenant account is deactivated
    #[error("tenant inactive: {tenant}")]
    TenantInactive { tenant: String },

    /// A non-positive adjustment was requested
    #[error("invalid amount: {amount}")]
    InvalidAmount { amount: i64 },
}
