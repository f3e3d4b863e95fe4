use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Compute the hex HMAC-SHA256 signature carried in `X-Webhook-Signature`.
///
/// The signature covers the raw serialized JSON body, nothing else, so a
/// subscriber holding the shared secret can verify it against the bytes
/// it received without re-serializing.
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("hmac-sha256 accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a received signature. Constant-time on the MAC comparison.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("hmac-sha256 accepts any key length");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let secret = b"supersecret";
        let payload = br#"{"id":123,"event_type":"event.created"}"#;

        let sig = compute_signature(secret, payload);
        assert!(verify_signature(secret, payload, &sig));
    }

    #[test]
    fn signature_matches_independent_hmac() {
        // A subscriber computing hex(HMAC-SHA256(secret, body)) on its own
        // must arrive at the same value.
        let secret = b"s3cr3t";
        let payload = br#"{"n":1}"#;

        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(compute_signature(secret, payload), expected);
    }

    #[test]
    fn tampered_payload_rejected() {
        let sig = compute_signature(b"k", b"payload");
        assert!(!verify_signature(b"k", b"payload2", &sig));
        assert!(!verify_signature(b"other", b"payload", &sig));
        assert!(!verify_signature(b"k", b"payload", "not-hex"));
    }
}
