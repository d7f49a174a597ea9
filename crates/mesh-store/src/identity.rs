//! Self-identity, persisted at `config/identity`.
//!
//! The send pipeline fills `replyTo` from self's ip/port/token whenever it
//! builds a `type=request` envelope, so this node's own reachable address
//! has to live somewhere durable. Identity carries the node's own name
//! plus the ip/port other peers use to reach it, stored as a small JSON
//! record rather than a bare name file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfInfo {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

pub fn load_identity(path: &Path) -> Result<Option<SelfInfo>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&s)?))
}

pub fn save_identity(path: &Path, info: &SelfInfo) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(info)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity");
        let info = SelfInfo {
            name: "agent-a".into(),
            ip: "10.0.0.1".into(),
            port: 9000,
        };
        save_identity(&path, &info).unwrap();
        let loaded = load_identity(&path).unwrap().unwrap();
        assert_eq!(loaded.name, "agent-a");
        assert_eq!(loaded.port, 9000);
    }

    #[test]
    fn missing_identity_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_identity(&dir.path().join("missing")).unwrap().is_none());
    }
}
