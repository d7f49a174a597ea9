//! Known-peer registry: addresses, tokens, and this node's own identity.

use mesh_types::{MeshError, Peer, Registry};

use crate::locked::LockedJsonStore;

pub struct RegistryStore {
    inner: LockedJsonStore<Registry>,
    self_name: String,
}

impl RegistryStore {
    pub fn open(path: impl Into<std::path::PathBuf>, self_name: impl Into<String>) -> Self {
        RegistryStore {
            inner: LockedJsonStore::new(path),
            self_name: self_name.into(),
        }
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn peer(&self, name: &str) -> Result<Peer, MeshError> {
        let reg = self.inner.get()?;
        reg.peers
            .get(name)
            .cloned()
            .ok_or_else(|| MeshError::UnknownPeer(name.to_string()))
    }

    pub fn peers(&self) -> Result<Vec<(String, Peer)>, MeshError> {
        let reg = self.inner.get()?;
        Ok(reg.peers.into_iter().collect())
    }

    pub fn is_signing(&self, name: &str) -> Result<bool, MeshError> {
        Ok(self.peer(name)?.signing)
    }

    pub fn upsert_peer(&self, name: &str, peer: Peer) -> Result<(), MeshError> {
        self.inner
            .mutate(|reg| {
                reg.self_name = self.self_name.clone();
                reg.peers.insert(name.to_string(), peer);
            })
            .map_err(Into::into)
    }

    pub fn remove_peer(&self, name: &str) -> Result<(), MeshError> {
        self.inner
            .mutate(|reg| {
                reg.peers.remove(name);
            })
            .map_err(Into::into)
    }

    pub fn snapshot(&self) -> Result<Registry, MeshError> {
        self.inner.get().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::PeerRole;

    fn peer() -> Peer {
        Peer {
            ip: "10.0.0.2".into(),
            port: 9000,
            token: "tok".into(),
            role: PeerRole::Peer,
            hook_path: "/hooks/agent-a".into(),
            signing: true,
        }
    }

    #[test]
    fn unknown_peer_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("registry.json"), "agent-a");
        assert!(matches!(store.peer("agent-b"), Err(MeshError::UnknownPeer(_))));
    }

    #[test]
    fn upsert_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("registry.json"), "agent-a");
        store.upsert_peer("agent-b", peer()).unwrap();
        let got = store.peer("agent-b").unwrap();
        assert_eq!(got.ip, "10.0.0.2");
        assert!(store.is_signing("agent-b").unwrap());
    }

    #[test]
    fn registry_file_is_owner_only_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = RegistryStore::open(&path, "agent-a");
        store.upsert_peer("agent-b", peer()).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }
}
