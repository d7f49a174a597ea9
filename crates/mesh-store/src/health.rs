//! Peer-health and routing-table stores.

use std::collections::BTreeMap;

use mesh_types::{MeshError, PeerHealth, RoutingTable};
use serde::{Deserialize, Serialize};

use crate::locked::LockedJsonStore;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PeerHealthTable(pub BTreeMap<String, PeerHealth>);

pub struct PeerHealthStore {
    inner: LockedJsonStore<PeerHealthTable>,
}

impl PeerHealthStore {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        PeerHealthStore {
            inner: LockedJsonStore::new(path),
        }
    }

    pub fn set(&self, peer: &str, health: PeerHealth) -> Result<(), MeshError> {
        self.inner
            .mutate(|t| {
                t.0.insert(peer.to_string(), health);
            })
            .map_err(Into::into)
    }

    pub fn get(&self, peer: &str) -> Result<Option<PeerHealth>, MeshError> {
        Ok(self.inner.get()?.0.get(peer).cloned())
    }

    pub fn snapshot(&self) -> Result<PeerHealthTable, MeshError> {
        self.inner.get().map_err(Into::into)
    }
}

pub struct RoutingStore {
    inner: LockedJsonStore<RoutingTable>,
}

impl RoutingStore {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        RoutingStore {
            inner: LockedJsonStore::new(path),
        }
    }

    pub fn get(&self) -> Result<RoutingTable, MeshError> {
        self.inner.get().map_err(Into::into)
    }

    pub fn update(&self, f: impl FnOnce(&mut RoutingTable)) -> Result<(), MeshError> {
        self.inner.mutate(f).map_err(Into::into)
    }
}
