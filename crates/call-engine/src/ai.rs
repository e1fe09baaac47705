//! AI provider streaming protocol
//!
//! One bidirectional streaming exchange per utterance: we send audio
//! chunks and control frames, the provider streams tokens back and marks
//! the utterance end. Cancellation is asynchronous — the provider may
//! acknowledge a cancel after tokens for the next utterance have already
//! begun — so every inbound frame carries the utterance id it belongs to
//! and stale frames are dropped on receipt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use voicedesk_gateway_core::HaGateway;
use voicedesk_infra_common::SessionId;

/// Frames we send to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AiOutbound {
    AudioChunk {
        utterance_id: u64,
        #[serde(with = "serde_bytes_base64")]
        bytes: Vec<u8>,
    },
    /// Close the caller's turn and ask for a response
    Commit { utterance_id: u64 },
    /// Abort an in-flight response (barge-in)
    Cancel { utterance_id: u64 },
}

/// Frames the provider streams back
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AiInbound {
    Token { utterance_id: u64, token: String },
    UtteranceEnd { utterance_id: u64 },
    /// Out-of-band request from the model, e.g. a transfer intent
    FunctionCall {
        utterance_id: u64,
        name: String,
        arguments: serde_json::Value,
    },
    /// May arrive out of order relative to newer utterances
    CancelAck { utterance_id: u64 },
    Error { detail: String },
}

mod serde_bytes_base64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error, Clone)]
pub enum AiError {
    #[error("AI provider unavailable: {0}")]
    Unavailable(String),
    #[error("AI stream closed unexpectedly")]
    StreamClosed,
}

/// Capability trait over the provider connection.
///
/// The default implementation rides the HA gateway; tests use a scripted
/// provider.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Begin a response utterance. The returned receiver yields inbound
    /// frames until the utterance ends or errors.
    async fn start_utterance(
        &self,
        session: &SessionId,
        utterance_id: u64,
        transcript: &[String],
    ) -> Result<mpsc::UnboundedReceiver<AiInbound>, AiError>;

    /// Request cancellation of an in-flight utterance
    async fn cancel(&self, session: &SessionId, utterance_id: u64) -> Result<(), AiError>;
}

/// Per-session turn bookkeeping: which utterance is current, and which
/// stale frames to drop.
#[derive(Debug, Default)]
pub struct TurnTracker {
    current: Option<u64>,
    next_id: u64,
    cancelled: Vec<u64>,
}

impl TurnTracker {
    pub fn new() -> Self {
        TurnTracker::default()
    }

    /// Allocate the next utterance id and make it current
    pub fn begin(&mut self) -> u64 {
        self.next_id += 1;
        self.current = Some(self.next_id);
        self.next_id
    }

    pub fn current(&self) -> Option<u64> {
        self.current
    }

    /// Mark the current utterance cancelled (barge-in); its frames will be
    /// dropped from now on.
    pub fn cancel_current(&mut self) -> Option<u64> {
        let cancelled = self.current.take();
        if let Some(id) = cancelled {
            self.cancelled.push(id);
        }
        cancelled
    }

    /// Close the current utterance normally
    pub fn finish(&mut self, utterance_id: u64) {
        if self.current == Some(utterance_id) {
            self.current = None;
        }
    }

    /// Whether an inbound frame for this utterance should be processed.
    /// Tokens for cancelled or superseded utterances are dropped on
    /// receipt; cancel-acks are always accepted (and may arrive late).
    pub fn accepts(&self, frame: &AiInbound) -> bool {
        match frame {
            AiInbound::Token { utterance_id, .. }
            | AiInbound::UtteranceEnd { utterance_id }
            | AiInbound::FunctionCall { utterance_id, .. } => self.current == Some(*utterance_id),
            AiInbound::CancelAck { utterance_id } => {
                if !self.cancelled.contains(utterance_id) {
                    debug!(utterance_id, "cancel-ack for unknown utterance");
                }
                true
            }
            AiInbound::Error { .. } => true,
        }
    }
}

/// Provider implementation that reaches the external AI service through
/// the HA gateway. The wire exchange itself is owned by the provider; we
/// only choose the endpoint and account the outcome.
pub struct GatewayAiProvider {
    gateway: std::sync::Arc<HaGateway>,
    client: reqwest::Client,
}

impl GatewayAiProvider {
    pub fn new(gateway: std::sync::Arc<HaGateway>) -> Self {
        GatewayAiProvider {
            gateway,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AiProvider for GatewayAiProvider {
    async fn start_utterance(
        &self,
        session: &SessionId,
        utterance_id: u64,
        transcript: &[String],
    ) -> Result<mpsc::UnboundedReceiver<AiInbound>, AiError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let body = serde_json::json!({
            "session": session.to_string(),
            "utterance_id": utterance_id,
            "transcript": transcript,
        });
        let client = self.client.clone();
        let result = self
            .gateway
            .execute(|endpoint| {
                let client = client.clone();
                let body = body.clone();
                async move {
                    let response = client
                        .post(format!("{}/v1/turns", endpoint.url.trim_end_matches('/')))
                        .timeout(std::time::Duration::from_secs(endpoint.timeout_seconds))
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    if !response.status().is_success() {
                        return Err(format!("provider status {}", response.status()));
                    }
                    response
                        .json::<Vec<AiInbound>>()
                        .await
                        .map_err(|e| e.to_string())
                }
            })
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        for frame in result {
            if tx.send(frame).is_err() {
                warn!(session = %session, "AI frame receiver dropped");
                break;
            }
        }
        Ok(rx)
    }

    async fn cancel(&self, session: &SessionId, utterance_id: u64) -> Result<(), AiError> {
        let body = serde_json::json!({
            "session": session.to_string(),
            "frame": AiOutbound::Cancel { utterance_id },
        });
        let client = self.client.clone();
        self.gateway
            .execute(|endpoint| {
                let client = client.clone();
                let body = body.clone();
                async move {
                    client
                        .post(format!("{}/v1/control", endpoint.url.trim_end_matches('/')))
                        .timeout(std::time::Duration::from_secs(endpoint.timeout_seconds))
                        .json(&body)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                }
            })
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))
    }
}
