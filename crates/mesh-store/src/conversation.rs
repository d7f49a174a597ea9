//! Conversation store — one JSON file per conversation under
//! `state/conversations/`.

use std::path::PathBuf;

use mesh_types::{ConversationRecord, MeshError};

use crate::locked::{write_atomic, LockedJsonStore};
use crate::paths::MeshPaths;

pub struct ConversationStore {
    paths: MeshPaths,
}

impl ConversationStore {
    pub fn new(paths: MeshPaths) -> Self {
        ConversationStore { paths }
    }

    fn store_for(&self, conv_id: &str) -> LockedJsonStore<Option<ConversationRecord>> {
        LockedJsonStore::new(self.paths.conversation(conv_id))
    }

    pub fn save(&self, record: &ConversationRecord) -> Result<(), MeshError> {
        self.store_for(&record.conversation_id)
            .mutate(|slot| *slot = Some(record.clone()))
            .map_err(Into::into)
    }

    pub fn get(&self, conv_id: &str) -> Result<Option<ConversationRecord>, MeshError> {
        Ok(self.store_for(conv_id).get()?)
    }

    pub fn mutate(
        &self,
        conv_id: &str,
        f: impl FnOnce(&mut ConversationRecord),
    ) -> Result<Option<ConversationRecord>, MeshError> {
        self.store_for(conv_id)
            .mutate(|slot| {
                if let Some(record) = slot.as_mut() {
                    f(record);
                }
                slot.clone()
            })
            .map_err(Into::into)
    }

    pub fn list_ids(&self) -> Result<Vec<String>, MeshError> {
        let dir = self.paths.conversations_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| MeshError::Store(e.to_string()))? {
            let entry = entry.map_err(|e| MeshError::Store(e.to_string()))?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }

    pub fn list_all(&self) -> Result<Vec<ConversationRecord>, MeshError> {
        let mut out = Vec::new();
        for id in self.list_ids()? {
            if let Some(record) = self.get(&id)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Move a conversation record from the live directory to
    /// `state/conversations-archive/{convId}.json`.
    pub fn archive(&self, conv_id: &str) -> Result<(), MeshError> {
        let Some(record) = self.get(conv_id)? else {
            return Ok(());
        };
        let archive_path = self.paths.conversation_archive(conv_id);
        write_atomic(&archive_path, &record)?;
        let live_path: PathBuf = self.paths.conversation(conv_id);
        let _ = std::fs::remove_file(live_path);
        Ok(())
    }
}
