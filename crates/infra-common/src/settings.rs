//! Process settings
//!
//! Secrets are read from the environment exactly once at startup and held
//! in memory for the life of the process. They are never logged: the
//! [`Settings`] `Debug` impl redacts every secret field.

use std::env;

/// Process-wide settings assembled from the environment.
#[derive(Clone)]
pub struct Settings {
    /// Bind address for the admin API
    pub bind_addr: String,
    /// Signing key for admin bearer tokens
    pub jwt_secret: String,
    /// Shared secret for carrier webhook signatures
    pub carrier_auth_token: String,
    /// API key for the AI provider
    pub ai_provider_key: String,
    /// Salt for caller fingerprint hashing
    pub fingerprint_salt: String,
    /// Emit JSON logs
    pub log_json: bool,
}

impl Settings {
    /// Load settings from the environment, falling back to development
    /// defaults for non-secret values. Missing secrets fall back to
    /// process-local random values so a misconfigured deployment fails
    /// closed (tokens from other processes will not verify).
    pub fn from_env() -> Self {
        Settings {
            bind_addr: env::var("VOICEDESK_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            jwt_secret: env::var("VOICEDESK_JWT_SECRET")
                .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            carrier_auth_token: env::var("VOICEDESK_CARRIER_TOKEN")
                .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            ai_provider_key: env::var("VOICEDESK_AI_KEY")
                .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            fingerprint_salt: env::var("VOICEDESK_FINGERPRINT_SALT")
                .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            log_json: env::var("VOICEDESK_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"[REDACTED_SECRET]")
            .field("carrier_auth_token", &"[REDACTED_SECRET]")
            .field("ai_provider_key", &"[REDACTED_SECRET]")
            .field("fingerprint_salt", &"[REDACTED_SECRET]")
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let settings = Settings {
            bind_addr: "127.0.0.1:9090".into(),
            jwt_secret: "super-secret".into(),
            carrier_auth_token: "carrier-secret".into(),
            ai_provider_key: "ai-secret".into(),
            fingerprint_salt: "salt".into(),
            log_json: false,
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("carrier-secret"));
        assert!(rendered.contains("[REDACTED_SECRET]"));
        assert!(rendered.contains("127.0.0.1:9090"));
    }
}
