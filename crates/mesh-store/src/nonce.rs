//! Nonce log — replay protection.
//!
//! Append-only `(epoch_ms, sender, nonce)` lines. Held in memory as a
//! `HashSet` for fast lookup (checked on every inbound envelope), with the
//! on-disk file replayed at startup so a restart does not forget recently
//! seen nonces inside the replay window.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use mesh_types::MeshError;

use crate::error::StoreError;

pub struct NonceLog {
    path: PathBuf,
    seen: Mutex<HashSet<(String, String)>>,
}

impl NonceLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MeshError> {
        let path = path.into();
        let mut seen = HashSet::new();
        if let Ok(file) = std::fs::File::open(&path) {
            for line in std::io::BufReader::new(file).lines().map_while(Result::ok) {
                let mut parts = line.splitn(3, '\t');
                if let (Some(_ts), Some(sender), Some(nonce)) =
                    (parts.next(), parts.next(), parts.next())
                {
                    seen.insert((sender.to_string(), nonce.to_string()));
                }
            }
        }
        Ok(NonceLog {
            path,
            seen: Mutex::new(seen),
        })
    }

    /// Returns `true` if `(sender, nonce)` was already recorded.
    pub fn has_seen(&self, sender: &str, nonce: &str) -> bool {
        self.seen
            .lock()
            .unwrap()
            .contains(&(sender.to_string(), nonce.to_string()))
    }

    /// Record a newly accepted nonce, appending it to the on-disk log.
    pub fn record(&self, sender: &str, nonce: &str, now_ms: i64) -> Result<(), StoreError> {
        {
            let mut seen = self.seen.lock().unwrap();
            seen.insert((sender.to_string(), nonce.to_string()));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{now_ms}\t{sender}\t{nonce}")?;
        Ok(())
    }

    /// Drop in-memory and on-disk entries older than `2 * replay_window_secs`.
    pub fn compact(&self, now_ms: i64, replay_window_secs: u64) -> Result<(), StoreError> {
        let cutoff = now_ms - 2 * (replay_window_secs as i64) * 1000;
        let mut kept: Vec<(i64, String, String)> = Vec::new();
        if let Ok(file) = std::fs::File::open(&self.path) {
            for line in std::io::BufReader::new(file).lines().map_while(Result::ok) {
                let mut parts = line.splitn(3, '\t');
                if let (Some(ts), Some(sender), Some(nonce)) =
                    (parts.next(), parts.next(), parts.next())
                {
                    if let Ok(ts) = ts.parse::<i64>() {
                        if ts >= cutoff {
                            kept.push((ts, sender.to_string(), nonce.to_string()));
                        }
                    }
                }
            }
        }

        {
            let mut seen = self.seen.lock().unwrap();
            seen.clear();
            seen.extend(kept.iter().map(|(_, s, n)| (s.clone(), n.clone())));
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&self.path)?;
        for (ts, sender, nonce) in kept {
            writeln!(file, "{ts}\t{sender}\t{nonce}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_nonce_is_not_seen() {
        let dir = tempfile::tempdir().unwrap();
        let log = NonceLog::open(dir.path().join("nonces.log")).unwrap();
        assert!(!log.has_seen("a", "n1"));
    }

    #[test]
    fn recorded_nonce_is_seen_including_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.log");
        let log = NonceLog::open(&path).unwrap();
        log.record("a", "n1", 1000).unwrap();
        assert!(log.has_seen("a", "n1"));

        let reloaded = NonceLog::open(&path).unwrap();
        assert!(reloaded.has_seen("a", "n1"));
    }

    #[test]
    fn compact_drops_old_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.log");
        let log = NonceLog::open(&path).unwrap();
        log.record("a", "old", 0).unwrap();
        log.record("a", "new", 1_000_000).unwrap();

        log.compact(1_000_000, 300).unwrap();
        assert!(!log.has_seen("a", "old"));
        assert!(log.has_seen("a", "new"));
    }
}
