//! Advisory locks on sidecar `.lock` files.
//!
//! Data files are replaced (snapshot) or renamed away (audit rollup), so a
//! lock taken on the data file itself can end up guarding a file nobody else
//! sees any more. Every reader and writer of `foo.wal` or `foo.json` instead
//! locks `foo.lock`, which is never moved.

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file guarding `data_path`
pub fn lock_path_for(data_path: &Path) -> PathBuf {
    data_path.with_extension("lock")
}

/// Held advisory lock; released when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until no other process holds the lock
    pub fn exclusive(data_path: &Path) -> Result<Self> {
        let lock = Self::open(data_path)?;
        lock.file
            .lock_exclusive()
            .map_err(|e| Error::Unavailable(format!("cannot lock {:?}: {}", lock.path, e)))?;
        Ok(lock)
    }

    /// Block until no other process holds the lock exclusively
    pub fn shared(data_path: &Path) -> Result<Self> {
        let lock = Self::open(data_path)?;
        lock.file
            .lock_shared()
            .map_err(|e| Error::Unavailable(format!("cannot lock {:?}: {}", lock.path, e)))?;
        Ok(lock)
    }

    fn open(data_path: &Path) -> Result<Self> {
        let path = lock_path_for(data_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self { file, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release lock {:?}: {}", self.path, e);
        }
    }
}
