//! Opt-in payload-body encryption.
//!
//! AES-256-CBC with a fresh random IV per message, PKCS7 padding. The
//! result replaces `payload.body`:
//! `{"enc":"aes-256-cbc","iv":"<hex>","data":"<base64>"}`.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

type Enc = cbc::Encryptor<Aes256>;
type Dec = cbc::Decryptor<Aes256>;

#[derive(Clone)]
pub struct EncryptionKey(pub [u8; 32]);

impl EncryptionKey {
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(EncryptionKey(arr))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        EncryptionKey(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[derive(Debug, Error)]
pub enum CryptError {
    #[error("padding or ciphertext malformed")]
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBody {
    pub enc: String,
    pub iv: String,
    pub data: String,
}

/// Encrypt `plaintext` (the serialized original `payload.body`) and return
/// the envelope-ready wrapper value.
pub fn encrypt_body(key: &EncryptionKey, plaintext: &[u8]) -> Value {
    let mut iv = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let ciphertext = Enc::new(&key.0.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let wrapper = EncryptedBody {
        enc: "aes-256-cbc".to_string(),
        iv: hex::encode(iv),
        data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &ciphertext),
    };
    serde_json::to_value(wrapper).expect("struct serializes")
}

/// Decrypt a previously-encrypted `payload.body` wrapper back to plaintext
/// bytes (typically the original JSON body, to be re-parsed by the caller).
pub fn decrypt_body(key: &EncryptionKey, wrapper: &Value) -> Result<Vec<u8>, CryptError> {
    let wrapper: EncryptedBody =
        serde_json::from_value(wrapper.clone()).map_err(|_| CryptError::Invalid)?;

    let iv_bytes = hex::decode(&wrapper.iv).map_err(|_| CryptError::Invalid)?;
    let iv: [u8; 16] = iv_bytes.try_into().map_err(|_| CryptError::Invalid)?;
    let ciphertext =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &wrapper.data)
            .map_err(|_| CryptError::Invalid)?;

    Dec::new(&key.0.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = EncryptionKey::generate();
        let plaintext = br#"{"count":"47"}"#;
        let wrapper = encrypt_body(&key, plaintext);
        let back = decrypt_body(&key, &wrapper).unwrap();
        assert_eq!(back, plaintext);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key = EncryptionKey::generate();
        let other = EncryptionKey::generate();
        let wrapper = encrypt_body(&key, b"secret");
        assert!(decrypt_body(&other, &wrapper).is_err());
    }

    #[test]
    fn iv_differs_across_calls() {
        let key = EncryptionKey::generate();
        let a = encrypt_body(&key, b"same plaintext");
        let b = encrypt_body(&key, b"same plaintext");
        assert_ne!(a["iv"], b["iv"]);
        assert_ne!(a["data"], b["data"]);
    }
}
