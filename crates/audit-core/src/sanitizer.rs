//! Payload sanitization
//!
//! Fixed rule set applied to every audit payload before storage. String
//! values are scrubbed for sensitive patterns; map keys whose names look
//! location- or address-shaped have their values replaced wholesale.
//!
//! The rules are deliberately not configurable: privacy compliance is not a
//! per-tenant policy knob.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap());

static IPV6: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b").unwrap());

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\+?1?[-.\s]?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b").unwrap()
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-?\d{2}-?\d{4}\b").unwrap());

static CREDIT_CARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap());

static COORDINATES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d{1,3}\.\d+,\s*-?\d{1,3}\.\d+").unwrap());

/// Key-name fragments that mark a value as location data
const LOCATION_KEYWORDS: &[&str] = &[
    "latitude",
    "longitude",
    "lat",
    "lng",
    "coordinates",
    "geolocation",
    "location",
    "address",
    "city",
    "state",
    "country",
    "zip",
    "postal",
    "gps",
    "position",
];

/// Scrub a single string value of all sensitive patterns.
///
/// Network addresses and coordinates are fully redacted; phone numbers and
/// emails are replaced by fixed placeholders so the shape of the payload
/// survives for debugging.
pub fn sanitize_string(text: &str) -> String {
    let out = IPV4.replace_all(text, "[REDACTED_LOCATION]");
    let out = IPV6.replace_all(&out, "[REDACTED_LOCATION]");
    let out = COORDINATES.replace_all(&out, "[REDACTED_LOCATION]");
    let out = PHONE.replace_all(&out, "XXX-XXX-XXXX");
    let out = EMAIL.replace_all(&out, "user@domain.com");
    let out = SSN.replace_all(&out, "[REDACTED_SSN]");
    let out = CREDIT_CARD.replace_all(&out, "[REDACTED_CREDIT_CARD]");
    out.into_owned()
}

/// Whether a key name marks its value as sensitive, and the replacement to
/// use if it does.
fn key_redaction(key: &str) -> Option<&'static str> {
    let key_lower = key.to_lowercase();
    if LOCATION_KEYWORDS.iter().any(|kw| key_lower.contains(kw)) {
        return Some("[REDACTED_LOCATION]");
    }
    if key_lower.contains("ip") || key_lower.contains("addr") {
        return Some("[REDACTED_IP]");
    }
    if key_lower.contains("password") || key_lower.contains("secret") || key_lower.contains("token")
    {
        return Some("[REDACTED_SECRET]");
    }
    None
}

/// Recursively sanitize a JSON payload.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if let Some(replacement) = key_redaction(key) {
                    out.insert(key.clone(), Value::String(replacement.to_string()));
                } else {
                    out.insert(key.clone(), sanitize_value(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::String(s) => Value::String(sanitize_string(s)),
        other => other.clone(),
    }
}

/// Whether serialized text still contains a pattern that must never be
/// stored. Used as the post-sanitization verification gate.
pub fn contains_forbidden_pattern(text: &str) -> bool {
    IPV4.is_match(text) || IPV6.is_match(text) || COORDINATES.is_match(text)
}
