//! Webhook signature verification.
//!
//! Verifies `t=<unix>,v1=<hex>[,v1=<hex>...]` signature headers with
//! HMAC-SHA256 over `"{t}.{raw body}"`. Runs on the raw bytes, before any
//! JSON parsing, and never explains why a signature was rejected.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;

/// Default tolerance between the signed timestamp and now (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Parsed components of a signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// Decoded v1 candidates. More than one during secret rotation.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a signature header.
    ///
    /// Returns `None` if the timestamp is missing or malformed or if no
    /// decodable `v1` candidate is present. Unknown keys are ignored.
    pub fn parse(header: &str) -> Option<Self> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };

            match key {
                "t" => timestamp = Some(value.parse().ok()?),
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        v1_signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        if v1_signatures.is_empty() {
            return None;
        }

        Some(SignatureHeader {
            timestamp: timestamp?,
            v1_signatures,
        })
    }
}

/// Verifies `header` against `body` using the current time.
pub fn verify_signature(body: &[u8], header: &str, secret: &str, tolerance_secs: i64) -> bool {
    verify_signature_at(body, header, secret, tolerance_secs, Timestamp::now())
}

/// Verifies `header` against `body` as if the current time were `now`.
pub fn verify_signature_at(
    body: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: Timestamp,
) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Some(parsed) = SignatureHeader::parse(header) else {
        return false;
    };

    let skew = now.as_unix_secs().saturating_sub(parsed.timestamp);
    if skew.saturating_abs() > tolerance_secs {
        return false;
    }

    let Some(expected) = compute_signature(secret, parsed.timestamp, body) else {
        return false;
    };

    parsed
        .v1_signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
}

/// Verifier holding the shared webhook secret.
pub struct WebhookSignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookSignatureVerifier {
    pub fn new(secret: SecretString, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    pub fn verify(&self, body: &[u8], header: &str) -> bool {
        verify_signature(body, header, self.secret.expose_secret(), self.tolerance_secs)
    }

    pub fn verify_at(&self, body: &[u8], header: &str, now: Timestamp) -> bool {
        verify_signature_at(
            body,
            header,
            self.secret.expose_secret(),
            self.tolerance_secs,
            now,
        )
    }
}

impl std::fmt::Debug for WebhookSignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

fn compute_signature(secret: &str, timestamp: i64, body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Constant-time comparison; length mismatch fails fast.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a valid signature header for test fixtures.
#[cfg(test)]
pub fn sign_for_test(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let signature = compute_signature(secret, timestamp, body).unwrap();
    format!("t={},v1={}", timestamp, hex::encode(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret_12345";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"charge.refunded"}"#;
    const T: i64 = 1_704_067_200;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Header parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_single_candidate() {
        let header = SignatureHeader::parse("t=123,v1=abcd").unwrap();
        assert_eq!(header.timestamp, 123);
        assert_eq!(header.v1_signatures, vec![vec![0xab, 0xcd]]);
    }

    #[test]
    fn parses_multiple_candidates_and_ignores_unknown_keys() {
        let header = SignatureHeader::parse("t=1,v0=ffff,v1=00,v1=01,extra=x").unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn rejects_missing_timestamp() {
        assert!(SignatureHeader::parse("v1=abcd").is_none());
    }

    #[test]
    fn rejects_non_numeric_timestamp() {
        assert!(SignatureHeader::parse("t=soon,v1=abcd").is_none());
    }

    #[test]
    fn rejects_header_without_decodable_v1() {
        assert!(SignatureHeader::parse("t=1,v1=zz").is_none());
        assert!(SignatureHeader::parse("t=1").is_none());
        assert!(SignatureHeader::parse("").is_none());
    }

    // ══════════════════════════════════════════════════════════════
    // Verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature() {
        let header = sign_for_test(SECRET, T, BODY);
        assert!(verify_signature_at(BODY, &header, SECRET, 300, at(T + 10)));
    }

    #[test]
    fn rejects_tampered_body() {
        let header = sign_for_test(SECRET, T, BODY);
        let tampered = br#"{"id":"evt_2","type":"charge.refunded"}"#;
        assert!(!verify_signature_at(tampered, &header, SECRET, 300, at(T)));
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = sign_for_test("whsec_other", T, BODY);
        assert!(!verify_signature_at(BODY, &header, SECRET, 300, at(T)));
    }

    #[test]
    fn rejects_stale_and_future_timestamps() {
        let header = sign_for_test(SECRET, T, BODY);
        assert!(verify_signature_at(BODY, &header, SECRET, 300, at(T + 300)));
        assert!(!verify_signature_at(BODY, &header, SECRET, 300, at(T + 301)));
        assert!(verify_signature_at(BODY, &header, SECRET, 300, at(T - 300)));
        assert!(!verify_signature_at(BODY, &header, SECRET, 300, at(T - 301)));
    }

    #[test]
    fn accepts_any_matching_candidate_during_rotation() {
        let valid = sign_for_test(SECRET, T, BODY);
        let valid_sig = valid.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", T, "00".repeat(32), valid_sig);
        assert!(verify_signature_at(BODY, &header, SECRET, 300, at(T)));
    }

    #[test]
    fn rejects_truncated_signature() {
        let valid = sign_for_test(SECRET, T, BODY);
        let truncated = &valid[..valid.len() - 2];
        assert!(!verify_signature_at(BODY, truncated, SECRET, 300, at(T)));
    }

    #[test]
    fn rejects_empty_secret() {
        let header = sign_for_test("", T, BODY);
        assert!(!verify_signature_at(BODY, &header, "", 300, at(T)));
    }

    #[test]
    fn verifier_uses_configured_tolerance() {
        let verifier = WebhookSignatureVerifier::new(SecretString::new(SECRET.to_string()), 60);
        let header = sign_for_test(SECRET, T, BODY);
        assert!(verifier.verify_at(BODY, &header, at(T + 60)));
        assert!(!verifier.verify_at(BODY, &header, at(T + 61)));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let verifier = WebhookSignatureVerifier::new(SecretString::new(SECRET.to_string()), 60);
        assert!(!format!("{:?}", verifier).contains(SECRET));
    }
}
