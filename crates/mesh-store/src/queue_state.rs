//! Queue-drainer lifetime counters, persisted at `state/queue-state.json`.

use mesh_types::MeshError;
use serde::{Deserialize, Serialize};

use crate::locked::LockedJsonStore;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct QueueState {
    #[serde(rename = "totalReplayed")]
    pub total_replayed: u64,
    #[serde(rename = "lastDrainAt")]
    pub last_drain_at: Option<i64>,
}

pub struct QueueStateStore {
    inner: LockedJsonStore<QueueState>,
}

impl QueueStateStore {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        QueueStateStore {
            inner: LockedJsonStore::new(path),
        }
    }

    pub fn get(&self) -> Result<QueueState, MeshError> {
        self.inner.get().map_err(Into::into)
    }

    pub fn record_drain(&self, replayed: u64, now_ms: i64) -> Result<(), MeshError> {
        self.inner
            .mutate(|s| {
                s.total_replayed += replayed;
                s.last_drain_at = Some(now_ms);
            })
            .map_err(Into::into)
    }
}
