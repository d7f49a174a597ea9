//! The generic locked-JSON-file accessor every typed store is built on.
//!
//! Each piece of persisted state gets a typed accessor that guarantees
//! atomic update-or-abort and is safe across concurrent writers on the same
//! node: a file-level exclusive lock around read-modify-write, with the
//! result written back via temp-file-then-rename before the lock releases.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

/// A JSON file guarded by an OS file lock, holding a `T` that is read once
/// per operation and rewritten atomically (temp file + rename) whenever it
/// is mutated.
pub struct LockedJsonStore<T> {
    path: PathBuf,
    _marker: std::marker::PhantomData<T>,
}

impl<T> LockedJsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LockedJsonStore {
            path: path.into(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_locked(&self, exclusive: bool) -> Result<File, StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(file)
    }

    fn read_locked(file: &mut File) -> Result<T, StoreError> {
        let mut buf = String::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_string(&mut buf)?;
        if buf.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&buf)?)
    }

    /// Read the current value under a shared lock. Cheap, non-exclusive.
    pub fn get(&self) -> Result<T, StoreError> {
        let mut file = self.open_locked(false)?;
        let value = Self::read_locked(&mut file)?;
        FileExt::unlock(&file)?;
        Ok(value)
    }

    /// Alias for `get` — a point-in-time copy.
    pub fn snapshot(&self) -> Result<T, StoreError> {
        self.get()
    }

    /// Read-modify-write under an exclusive lock: `f` mutates the value in
    /// place; the result is written back via temp-file-then-rename before
    /// the lock is released. Returns whatever `f` returns.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut file = self.open_locked(true)?;
        let mut value = Self::read_locked(&mut file)?;
        let result = f(&mut value);
        write_atomic(&self.path, &value)?;
        FileExt::unlock(&file)?;
        Ok(result)
    }
}

/// Serialize `value` to a sibling temp file, then rename it into place: the
/// same "temp file + rename" pattern used by every store in this crate.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp_path = path.with_extension(format!(
        "tmp-{}",
        std::process::id()
    ));
    let json = serde_json::to_vec_pretty(value)?;
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    tighten_permissions(path);
    Ok(())
}

#[cfg(unix)]
fn tighten_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn tighten_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
    struct Counter {
        n: u64,
    }

    #[test]
    fn mutate_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");

        let store: LockedJsonStore<Counter> = LockedJsonStore::new(&path);
        store.mutate(|c| c.n += 1).unwrap();
        store.mutate(|c| c.n += 1).unwrap();

        let store2: LockedJsonStore<Counter> = LockedJsonStore::new(&path);
        assert_eq!(store2.get().unwrap(), Counter { n: 2 });
    }

    #[test]
    fn get_on_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let store: LockedJsonStore<Counter> = LockedJsonStore::new(&path);
        assert_eq!(store.get().unwrap(), Counter::default());
    }

    #[test]
    fn mutate_result_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        let store: LockedJsonStore<Counter> = LockedJsonStore::new(&path);
        let doubled = store.mutate(|c| {
            c.n = 5;
            c.n * 2
        }).unwrap();
        assert_eq!(doubled, 10);
    }
}
