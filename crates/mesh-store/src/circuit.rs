//! Circuit-breaker store.

use std::collections::BTreeMap;

use mesh_types::{CircuitRecord, MeshError};
use serde::{Deserialize, Serialize};

use crate::locked::LockedJsonStore;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CircuitTable(pub BTreeMap<String, CircuitRecord>);

pub struct CircuitStore {
    inner: LockedJsonStore<CircuitTable>,
}

impl CircuitStore {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        CircuitStore {
            inner: LockedJsonStore::new(path),
        }
    }

    pub fn get(&self, peer: &str) -> Result<CircuitRecord, MeshError> {
        let table = self.inner.get()?;
        Ok(table.0.get(peer).cloned().unwrap_or_default())
    }

    /// Read-modify-write a single peer's record atomically.
    pub fn mutate_peer<R>(
        &self,
        peer: &str,
        f: impl FnOnce(&mut CircuitRecord) -> R,
    ) -> Result<R, MeshError> {
        self.inner
            .mutate(|table| {
                let record = table.0.entry(peer.to_string()).or_default();
                f(record)
            })
            .map_err(Into::into)
    }

    pub fn snapshot(&self) -> Result<CircuitTable, MeshError> {
        self.inner.get().map_err(Into::into)
    }
}
