//! Signing, encryption, and token primitives for the MESH envelope pipeline.

pub mod canonical;
pub mod encrypt;
pub mod sign;
pub mod token;

pub use encrypt::{decrypt_body, encrypt_body, CryptError, EncryptionKey};
pub use sign::{attach_signature, sign, verify, SigningKey};
pub use token::{generate_token, tokens_equal};
