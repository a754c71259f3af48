//! Webhook signature verification.
//!
//! The provider signs the raw request body with HMAC-SHA256 under the shared
//! secret and sends the hex digest in the `x-token` header. Verification runs
//! over the exact bytes received, before any JSON parsing, and the comparison
//! is constant-time via `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn verify_signature(secret: &str, raw_body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    // Hmac::new_from_slice accepts any key length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC over a body, as the provider computes it. Test and tooling use.
pub fn sign(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"transaction_id":"TXN-1","status":"ACCEPTED"}"#;
        let sig = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, &sig));
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = br#"{"transaction_id":"TXN-1"}"#;
        let sig = sign("topsecret", body);
        assert!(!verify_signature("othersecret", body, &sig));
    }

    #[test]
    fn tampered_body_rejected() {
        let body = br#"{"transaction_id":"TXN-1","status":"PENDING"}"#;
        let sig = sign("topsecret", body);
        let tampered = br#"{"transaction_id":"TXN-1","status":"ACCEPTED"}"#;
        assert!(!verify_signature("topsecret", tampered, &sig));
    }

    #[test]
    fn non_hex_signature_rejected() {
        assert!(!verify_signature("topsecret", b"{}", "not-hex!"));
        assert!(!verify_signature("topsecret", b"{}", ""));
    }

    #[test]
    fn whitespace_around_header_tolerated() {
        let body = b"payload";
        let sig = format!("  {}\n", sign("topsecret", body));
        assert!(verify_signature("topsecret", body, &sig));
    }
}
