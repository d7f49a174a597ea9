//! Dead-letter queue store, bounded FIFO.

use mesh_types::{DeadLetter, DeadLetterQueue, MeshError, DEFAULT_MAX_QUEUE};

use crate::locked::LockedJsonStore;

pub struct DeadLetterStore {
    inner: LockedJsonStore<DeadLetterQueue>,
    max_queue: usize,
}

impl DeadLetterStore {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_MAX_QUEUE)
    }

    pub fn with_capacity(path: impl Into<std::path::PathBuf>, max_queue: usize) -> Self {
        DeadLetterStore {
            inner: LockedJsonStore::new(path),
            max_queue,
        }
    }

    /// Push a new dead letter, evicting the oldest if the queue is already
    /// at capacity. Returns `true` if an eviction happened (the caller logs
    /// `QueueOverflow`).
    pub fn push(&self, entry: DeadLetter) -> Result<bool, MeshError> {
        self.inner
            .mutate(|q| {
                let mut overflowed = false;
                while q.entries.len() >= self.max_queue {
                    q.entries.pop_front();
                    q.dropped += 1;
                    overflowed = true;
                }
                q.entries.push_back(entry);
                overflowed
            })
            .map_err(Into::into)
    }

    pub fn remove(&self, id: &str) -> Result<bool, MeshError> {
        self.inner
            .mutate(|q| {
                let before = q.entries.len();
                q.entries.retain(|e| e.id != id);
                before != q.entries.len()
            })
            .map_err(Into::into)
    }

    /// Remove every entry whose `timestamp + ttl < now_ms`.
    pub fn purge_expired(&self, now_ms: i64) -> Result<usize, MeshError> {
        self.inner
            .mutate(|q| {
                let before = q.entries.len();
                q.entries
                    .retain(|e| e.timestamp + (e.envelope.ttl as i64) * 1000 >= now_ms);
                before - q.entries.len()
            })
            .map_err(Into::into)
    }

    pub fn snapshot(&self) -> Result<DeadLetterQueue, MeshError> {
        self.inner.get().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::{Envelope, EnvelopeType};

    fn dl(id: &str) -> DeadLetter {
        let mut e = Envelope::builder("a", "b", EnvelopeType::Notification);
        e.payload.subject = "x".into();
        DeadLetter {
            id: id.to_string(),
            timestamp: 0,
            to: "b".into(),
            fail_reason: "transport_exhausted".into(),
            attempts: 4,
            envelope: e,
        }
    }

    #[test]
    fn bounded_fifo_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeadLetterStore::with_capacity(dir.path().join("dl.json"), 2);
        store.push(dl("1")).unwrap();
        store.push(dl("2")).unwrap();
        let overflowed = store.push(dl("3")).unwrap();
        assert!(overflowed);
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.entries[0].id, "2");
        assert_eq!(snap.entries[1].id, "3");
    }

    #[test]
    fn purge_expired_removes_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeadLetterStore::open(dir.path().join("dl.json"));
        let mut stale = dl("stale");
        stale.timestamp = 0;
        stale.envelope.ttl = 1;
        store.push(stale).unwrap();

        let removed = store.purge_expired(10_000).unwrap();
        assert_eq!(removed, 1);
        assert!(store.snapshot().unwrap().entries.is_empty());
    }
}
