//! Engine configuration
//!
//! Grouped into sections the way the platform is operated: general limits,
//! per-state session timeouts, routing behavior, and admin rate limits.
//! Everything has a workable default so tests and examples run with
//! `EngineConfig::default()`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::types::SessionState;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub general: GeneralConfig,
    pub timeouts: SessionTimeouts,
    pub routing: RoutingConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Display domain used in logs and TwiML comments
    pub domain: String,
    /// Hard cap on concurrent sessions across all tenants
    pub max_concurrent_calls: u32,
    /// Greeting played on ingress
    pub greeting_text: String,
    /// Canned utterance substituted when the AI provider fails
    pub ai_fallback_text: String,
    /// Language the assistant works in; caller speech is translated into
    /// it and replies translated back when a session declares a language
    pub service_language: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            domain: "voicedesk.local".to_string(),
            max_concurrent_calls: 500,
            greeting_text: "Thank you for calling. How can I help you today?".to_string(),
            ai_fallback_text:
                "I'm sorry, I'm having trouble right now. Let me connect you with someone."
                    .to_string(),
            service_language: "en".to_string(),
        }
    }
}

/// Wall-clock timeout per session state. Expiry terminates the session
/// with outcome `timeout`, except `routing`, which falls back per tenant
/// policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTimeouts {
    pub ingress: Duration,
    pub greeting: Duration,
    pub ai_turn: Duration,
    pub waiting_caller: Duration,
    pub classifying: Duration,
    pub routing: Duration,
    pub voicemail: Duration,
    pub callback_capture: Duration,
    /// Call duration cap while bridged
    pub bridged: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        SessionTimeouts {
            ingress: Duration::from_secs(10),
            greeting: Duration::from_secs(30),
            ai_turn: Duration::from_secs(30),
            waiting_caller: Duration::from_secs(60),
            classifying: Duration::from_secs(10),
            routing: Duration::from_secs(30),
            voicemail: Duration::from_secs(180),
            callback_capture: Duration::from_secs(180),
            bridged: Duration::from_secs(3600),
        }
    }
}

impl SessionTimeouts {
    pub fn for_state(&self, state: SessionState) -> Duration {
        match state {
            SessionState::Ingress => self.ingress,
            SessionState::Greeting => self.greeting,
            SessionState::AiTurn => self.ai_turn,
            SessionState::WaitingCaller => self.waiting_caller,
            SessionState::Classifying => self.classifying,
            SessionState::Routing => self.routing,
            SessionState::Voicemail => self.voicemail,
            SessionState::CallbackCapture => self.callback_capture,
            SessionState::Bridged => self.bridged,
            // Terminal: the task exits before this is consulted
            SessionState::Terminated => Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// How long one agent offer may sit unanswered
    pub offer_timeout: Duration,
    /// Offers per transfer before giving up
    pub max_offer_attempts: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            offer_timeout: Duration::from_secs(10),
            max_offer_attempts: 3,
        }
    }
}

/// Token-bucket limits for the admin surface, per authenticated principal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            requests_per_minute: 120,
            burst: 20,
        }
    }
}
