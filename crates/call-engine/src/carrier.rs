//! Carrier (telephony) surface
//!
//! The carrier speaks to us through a signed webhook and we answer with a
//! small XML instruction document. Only that surface is modeled here; the
//! carrier itself is an external collaborator.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use voicedesk_infra_common::CallId;

use crate::error::{EngineError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Kinds of call events the carrier reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierEventKind {
    Incoming,
    InProgress,
    Completed,
    Failed,
}

/// Parsed carrier webhook body.
///
/// Unknown fields land in `extras` rather than being silently absorbed;
/// the edge decides whether to reject or audit them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierEvent {
    /// Opaque carrier-side call id
    pub call_id: CallId,
    /// The tenant DID that was dialed
    pub tenant_did: String,
    pub kind: CarrierEventKind,
    /// Raw caller number; held in memory only, never persisted
    pub caller_number: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// Verify the carrier's HMAC signature over the raw body.
///
/// The signature header carries base64(HMAC-SHA256(body, shared token)).
/// Unsigned or mis-signed requests are rejected.
pub fn verify_signature(token: &str, body: &[u8], signature_header: Option<&str>) -> Result<()> {
    let Some(signature) = signature_header else {
        return Err(EngineError::SignatureRejected);
    };
    let provided = BASE64
        .decode(signature.trim())
        .map_err(|_| EngineError::SignatureRejected)?;
    let mut mac = HmacSha256::new_from_slice(token.as_bytes())
        .map_err(|e| EngineError::internal(format!("hmac init: {}", e)))?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| EngineError::SignatureRejected)
}

/// Compute the signature for a body; used by tests and outbound carrier
/// API calls that the carrier verifies with the same scheme.
pub fn sign_body(token: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(token.as_bytes()).expect("hmac accepts any key");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// One instruction in a carrier response document
#[derive(Debug, Clone, PartialEq)]
pub enum CarrierVerb {
    /// Play text-to-speech to the caller
    Say { text: String },
    /// Start a media stream to our media socket
    Stream { url: String },
    /// Bridge the call to a PSTN endpoint
    Dial { endpoint: String },
    /// Record into a voicemail box
    Record { box_id: String },
    /// Hang the call up
    Hangup,
}

/// TwiML-equivalent response document builder.
#[derive(Debug, Clone, Default)]
pub struct CarrierResponse {
    verbs: Vec<CarrierVerb>,
}

impl CarrierResponse {
    pub fn new() -> Self {
        CarrierResponse { verbs: Vec::new() }
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(CarrierVerb::Say { text: text.into() });
        self
    }

    pub fn stream(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(CarrierVerb::Stream { url: url.into() });
        self
    }

    pub fn dial(mut self, endpoint: impl Into<String>) -> Self {
        self.verbs.push(CarrierVerb::Dial {
            endpoint: endpoint.into(),
        });
        self
    }

    pub fn record(mut self, box_id: impl Into<String>) -> Self {
        self.verbs.push(CarrierVerb::Record {
            box_id: box_id.into(),
        });
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(CarrierVerb::Hangup);
        self
    }

    /// Render the XML document the carrier executes
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>");
        for verb in &self.verbs {
            match verb {
                CarrierVerb::Say { text } => {
                    out.push_str(&format!("<Say>{}</Say>", escape_xml(text)));
                }
                CarrierVerb::Stream { url } => {
                    out.push_str(&format!("<Stream url=\"{}\"/>", escape_xml(url)));
                }
                CarrierVerb::Dial { endpoint } => {
                    out.push_str(&format!("<Dial>{}</Dial>", escape_xml(endpoint)));
                }
                CarrierVerb::Record { box_id } => {
                    out.push_str(&format!("<Record box=\"{}\"/>", escape_xml(box_id)));
                }
                CarrierVerb::Hangup => out.push_str("<Hangup/>"),
            }
        }
        out.push_str("</Response>");
        out
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
