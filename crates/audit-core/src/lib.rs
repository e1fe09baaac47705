//! # VoiceDesk Audit Core
//!
//! Privacy-compliant audit trail for the voicedesk stack.
//!
//! Every component records what it did through this crate, and this crate
//! guarantees that what gets recorded never contains caller network
//! addresses, geolocation, raw phone numbers, or other identifying payload
//! data. Two mechanisms enforce that:
//!
//! - **Sanitization** ([`sanitizer`]): every payload passes through a fixed
//!   rule set that strips sensitive patterns from string values and redacts
//!   values under location/address-shaped keys.
//! - **Rejection** ([`log`]): a payload that still matches a forbidden
//!   pattern after sanitization is refused with
//!   [`AuditError::PrivacyViolation`] rather than stored.
//!
//! Caller identities are admitted only as salted one-way hashes
//! ([`fingerprint`]); the raw number may exist in process memory for the
//! duration of a call and nowhere else.
//!
//! ## Quick Start
//!
//! ```
//! use voicedesk_audit_core::{AuditLog, AuditEventType, EventDraft};
//! use voicedesk_infra_common::TenantId;
//!
//! let log = AuditLog::new("example-salt");
//! let tenant = TenantId::from("tenant-acme");
//!
//! let event = log.emit(
//!     &tenant,
//!     EventDraft::new(AuditEventType::CallCompleted, "session_close")
//!         .with_payload(serde_json::json!({ "duration_seconds": 42 })),
//! ).unwrap();
//!
//! assert!(event.success);
//! assert_eq!(log.query(&tenant, Default::default()).len(), 1);
//! ```

pub mod error;
pub mod events;
pub mod fingerprint;
pub mod log;
pub mod sanitizer;

pub use error::{AuditError, Result};
pub use events::{AuditEvent, AuditEventType, EventDraft, QueryFilter};
pub use fingerprint::{normalize_number, valid_phone_number, CallerFingerprint, FingerprintHasher};
pub use log::AuditLog;
pub use sanitizer::{contains_forbidden_pattern, sanitize_string, sanitize_value};
