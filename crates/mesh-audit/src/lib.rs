//! Append-only audit log of node lifecycle events.
//!
//! Append-only JSONL. One file handle is opened in append mode and held
//! behind a `tokio::Mutex` for the process's lifetime rather than reopened
//! per call. The same primitive backs three sibling logs:
//! `mesh-audit.jsonl`, `queue-replay.jsonl`, and `discover.jsonl`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct JsonlLog {
    path: PathBuf,
    handle: Mutex<Option<tokio::fs::File>>,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlLog {
            path: path.into(),
            handle: Mutex::new(None),
        }
    }

    async fn ensure_open(&self) -> Result<(), AuditError> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        *guard = Some(file);
        Ok(())
    }

    /// Append one JSON line. Serializing and writing happen while holding
    /// the handle's mutex so concurrent callers never interleave partial
    /// lines.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<(), AuditError> {
        self.ensure_open().await?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut guard = self.handle.lock().await;
        let file = guard.as_mut().expect("ensure_open just set this");
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub use mesh_types::AuditEntry;

/// The node's primary audit log (`logs/mesh-audit.jsonl`).
pub struct AuditLog(JsonlLog);

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AuditLog(JsonlLog::new(path))
    }

    pub async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.0.append(&entry).await
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }
}
