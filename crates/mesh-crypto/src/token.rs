//! Bearer-token generation and constant-time comparison.
//!
//! A MESH peer token is a *shared* secret: both the caller (who presents it
//! as `Authorization: Bearer …`) and the receiver (who looks it up from its
//! registry entry for that sender) must hold the plaintext value, so
//! registry entries store tokens as-is rather than hashed. Comparison is
//! still constant-time to avoid leaking the secret through timing.

use rand::RngCore;
use subtle::ConstantTimeEq;

/// Generate a fresh random bearer token: 32 random bytes, base64url-encoded
/// (43 characters, no padding).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Constant-time token comparison, to avoid timing side-channels on bearer
/// auth checks in the receive pipeline.
pub fn tokens_equal(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_43_chars() {
        assert_eq!(generate_token().len(), 43);
    }

    #[test]
    fn two_tokens_differ() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn equal_tokens_compare_equal() {
        let t = generate_token();
        assert!(tokens_equal(&t, &t));
    }

    #[test]
    fn different_length_tokens_are_unequal() {
        assert!(!tokens_equal("abc", "abcd"));
    }
}
