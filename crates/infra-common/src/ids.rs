//! Typed identifiers
//!
//! Every entity in the platform is addressed by a string-backed newtype.
//! Cross-entity references are stored as ids, never as pointers; the owning
//! store is the single source of truth and callers resolve on demand.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "-{}"), uuid::Uuid::new_v4()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Tenant identifier — the top-level isolation boundary
    TenantId,
    "tenant"
);

string_id!(
    /// Call session identifier
    SessionId,
    "session"
);

string_id!(
    /// Agent identifier
    AgentId,
    "agent"
);

string_id!(
    /// Department identifier
    DepartmentId,
    "dept"
);

string_id!(
    /// Callback request identifier
    CallbackId,
    "callback"
);

string_id!(
    /// Callback attempt identifier
    AttemptId,
    "attempt"
);

string_id!(
    /// Service endpoint identifier in the HA pool
    EndpointId,
    "endpoint"
);

string_id!(
    /// Carrier-side opaque call identifier
    CallId,
    "call"
);

string_id!(
    /// Request correlation identifier for tracing across components
    CorrelationId,
    "corr"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("session-"));
    }

    #[test]
    fn ids_round_trip_serde() {
        let id = TenantId::from("tenant-acme");
        let json = serde_json::to_string(&id).unwrap();
        let back: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
