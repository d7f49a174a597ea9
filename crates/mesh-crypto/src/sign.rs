//! HMAC-SHA256 envelope signing.

use hmac::{Hmac, Mac};
use mesh_types::Envelope;
use sha2::Sha256;

use crate::canonical;

type HmacSha256 = Hmac<Sha256>;

/// A 256-bit shared signing key for one (sender, receiver) pair.
#[derive(Clone)]
pub struct SigningKey(pub [u8; 32]);

impl SigningKey {
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(SigningKey(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        SigningKey(bytes)
    }
}

/// The bytes an HMAC is computed over: the envelope, canonically encoded,
/// with the `signature` field removed.
fn signable_bytes(envelope: &Envelope) -> Vec<u8> {
    let mut value = serde_json::to_value(envelope).expect("Envelope serializes");
    if let Some(obj) = value.as_object_mut() {
        obj.remove("signature");
    }
    canonical::encode(&value)
}

/// Compute `"sha256:" + base64(HMAC-SHA256(key, envelope_without_signature))`.
pub fn sign(key: &SigningKey, envelope: &Envelope) -> String {
    let mut mac = HmacSha256::new_from_slice(&key.0).expect("any key length is valid for HMAC");
    mac.update(&signable_bytes(envelope));
    let tag = mac.finalize().into_bytes();
    format!(
        "sha256:{}",
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tag)
    )
}

/// Verify `envelope.signature` against `key`. Returns `false` for a missing
/// or malformed signature as well as a mismatched one — callers distinguish
/// "missing" from "invalid" themselves before calling this (see
/// `mesh-receive`'s validation order).
pub fn verify(key: &SigningKey, envelope: &Envelope) -> bool {
    let Some(sig) = &envelope.signature else {
        return false;
    };
    let Some(encoded) = sig.strip_prefix("sha256:") else {
        return false;
    };
    let Ok(tag_bytes) =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
    else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(&key.0).expect("any key length is valid for HMAC");
    mac.update(&signable_bytes(envelope));
    mac.verify_slice(&tag_bytes).is_ok()
}

/// Sign `envelope` in place.
pub fn attach_signature(key: &SigningKey, envelope: &mut Envelope) {
    envelope.signature = None;
    envelope.signature = Some(sign(key, envelope));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::EnvelopeType;

    fn sample() -> Envelope {
        let mut e = Envelope::builder("a", "b", EnvelopeType::Notification);
        e.payload.subject = "hi".into();
        e
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let key = SigningKey::generate();
        let mut e = sample();
        attach_signature(&key, &mut e);
        assert!(verify(&key, &e));
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let key = SigningKey::generate();
        let other = SigningKey::generate();
        let mut e = sample();
        attach_signature(&key, &mut e);
        assert!(!verify(&other, &e));
    }

    #[test]
    fn tampering_with_payload_breaks_verification() {
        let key = SigningKey::generate();
        let mut e = sample();
        attach_signature(&key, &mut e);
        e.payload.subject = "tampered".into();
        assert!(!verify(&key, &e));
    }

    #[test]
    fn verify_fails_when_signature_missing() {
        let key = SigningKey::generate();
        let e = sample();
        assert!(!verify(&key, &e));
    }

    #[test]
    fn round_trip_through_json_preserves_verification() {
        let key = SigningKey::generate();
        let mut e = sample();
        attach_signature(&key, &mut e);
        let s = serde_json::to_string(&e).unwrap();
        let back: Envelope = serde_json::from_str(&s).unwrap();
        assert!(verify(&key, &back));
    }
}
