//! On-disk signing/encryption key files.
//!
//! Keys are hex-encoded and written owner-only (0600).

use std::path::Path;

use mesh_crypto::{EncryptionKey, SigningKey};

use crate::error::StoreError;

fn write_secret(path: &Path, hex: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        f.write_all(hex.as_bytes())?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, hex)?;
    }
    Ok(())
}

pub fn load_signing_key(path: &Path) -> Result<Option<SigningKey>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(path)?;
    Ok(SigningKey::from_hex(s.trim()))
}

pub fn save_signing_key(path: &Path, key: &SigningKey) -> Result<(), StoreError> {
    write_secret(path, &key.to_hex())
}

pub fn load_encryption_key(path: &Path) -> Result<Option<EncryptionKey>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(path)?;
    Ok(EncryptionKey::from_hex(s.trim()))
}

pub fn save_encryption_key(path: &Path, key: &EncryptionKey) -> Result<(), StoreError> {
    write_secret(path, &key.to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.key");
        let key = SigningKey::generate();
        save_signing_key(&path, &key).unwrap();
        let loaded = load_signing_key(&path).unwrap().unwrap();
        assert_eq!(loaded.to_hex(), key.to_hex());
    }

    #[test]
    fn missing_key_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_signing_key(&dir.path().join("missing.key"))
            .unwrap()
            .is_none());
    }
}
