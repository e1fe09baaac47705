//! Caller fingerprinting
//!
//! A caller is identified in storage only by a salted one-way hash of the
//! digit-normalized phone number. The raw number may be held in process
//! memory for the duration of a call and is never persisted or logged.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Salted hash of a normalized caller number. The only caller-side
/// identifier admissible in persistent storage.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallerFingerprint(pub String);

impl CallerFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keyed hasher producing caller fingerprints.
#[derive(Clone)]
pub struct FingerprintHasher {
    salt: Vec<u8>,
}

impl FingerprintHasher {
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        FingerprintHasher {
            salt: salt.as_ref().to_vec(),
        }
    }

    /// Hash a raw caller number. Normalization strips every non-digit so
    /// formatting variants of the same number collide, which is what lets
    /// duplicate detection work without storing the number itself.
    pub fn fingerprint(&self, raw_number: &str) -> CallerFingerprint {
        let normalized = normalize_number(raw_number);
        let mut mac =
            HmacSha256::new_from_slice(&self.salt).expect("hmac accepts any key length");
        mac.update(normalized.as_bytes());
        let digest = mac.finalize().into_bytes();
        CallerFingerprint(BASE64.encode(digest))
    }
}

impl std::fmt::Debug for FingerprintHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintHasher")
            .field("salt", &"[REDACTED_SECRET]")
            .finish()
    }
}

/// Strip everything but digits from a phone number.
pub fn normalize_number(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validate a phone number's shape without retaining it. Accepts 10-15
/// digits after normalization.
pub fn valid_phone_number(raw: &str) -> bool {
    let digits = normalize_number(raw);
    (10..=15).contains(&digits.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting_variants_collide() {
        let hasher = FingerprintHasher::new("salt");
        let a = hasher.fingerprint("+1 (555) 123-4567");
        let b = hasher.fingerprint("15551234567");
        assert_eq!(a, b);
    }

    #[test]
    fn different_salts_diverge() {
        let a = FingerprintHasher::new("salt-a").fingerprint("5551234567");
        let b = FingerprintHasher::new("salt-b").fingerprint("5551234567");
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_does_not_leak_digits() {
        let print = FingerprintHasher::new("salt").fingerprint("5551234567");
        assert!(!print.as_str().contains("5551234567"));
    }

    #[test]
    fn phone_validation_bounds() {
        assert!(valid_phone_number("(555) 123-4567"));
        assert!(valid_phone_number("+44 20 7946 0958"));
        assert!(!valid_phone_number("12345"));
        assert!(!valid_phone_number(""));
    }

    #[test]
    fn hasher_debug_is_redacted() {
        let rendered = format!("{:?}", FingerprintHasher::new("top-secret"));
        assert!(!rendered.contains("top-secret"));
    }
}
