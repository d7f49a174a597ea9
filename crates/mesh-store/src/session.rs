//! Session store — one JSON file per session under `sessions/`.

use mesh_types::{MeshError, SessionRecord};

use crate::locked::LockedJsonStore;
use crate::paths::{sanitize_key, MeshPaths};

pub struct SessionStore {
    paths: MeshPaths,
}

impl SessionStore {
    pub fn new(paths: MeshPaths) -> Self {
        SessionStore { paths }
    }

    fn store_for(&self, session_key: &str) -> LockedJsonStore<Option<SessionRecord>> {
        LockedJsonStore::new(self.paths.session(&sanitize_key(session_key)))
    }

    pub fn get(&self, session_key: &str) -> Result<Option<SessionRecord>, MeshError> {
        Ok(self.store_for(session_key).get()?)
    }

    pub fn save(&self, record: &SessionRecord) -> Result<(), MeshError> {
        self.store_for(&record.session_key)
            .mutate(|slot| *slot = Some(record.clone()))
            .map_err(Into::into)
    }

    pub fn mutate(
        &self,
        session_key: &str,
        f: impl FnOnce(&mut SessionRecord),
    ) -> Result<Option<SessionRecord>, MeshError> {
        self.store_for(session_key)
            .mutate(|slot| {
                if let Some(record) = slot.as_mut() {
                    f(record);
                }
                slot.clone()
            })
            .map_err(Into::into)
    }

    pub fn list_keys(&self) -> Result<Vec<String>, MeshError> {
        let dir = self.paths.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| MeshError::Store(e.to_string()))? {
            let entry = entry.map_err(|e| MeshError::Store(e.to_string()))?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                keys.push(name.to_string());
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(MeshPaths::with_root(dir.path()));
        let record = SessionRecord::new("room/1".into(), vec!["a".into(), "b".into()], 0);
        store.save(&record).unwrap();
        let got = store.get("room/1").unwrap().unwrap();
        assert_eq!(got.participants, vec!["a".to_string(), "b".to_string()]);
    }
}
