//! Advisory file locks scoped to a single key.
//!
//! Each key maps to `locks/<key>.lock`. Locks are taken on a freshly opened
//! file, so they exclude other threads of this process as well as other
//! processes. Released on drop.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{io_err, Result};

/// Key of the engine-wide dependency graph lock.
pub const GRAPH: &str = "graph";
/// Key serializing epic number allocation.
pub const EPICS: &str = "epics";
/// Key serializing configuration writes.
pub const CONFIG: &str = "config";

#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub(crate) fn exclusive(dir: &Path, key: &str) -> Result<Self> {
        let guard = Self::open(dir, key)?;
        FileExt::lock_exclusive(&guard.file).map_err(io_err(&guard.path))?;
        tracing::trace!(key, "exclusive lock acquired");
        Ok(guard)
    }

    pub(crate) fn shared(dir: &Path, key: &str) -> Result<Self> {
        let guard = Self::open(dir, key)?;
        FileExt::lock_shared(&guard.file).map_err(io_err(&guard.path))?;
        tracing::trace!(key, "shared lock acquired");
        Ok(guard)
    }

    fn open(dir: &Path, key: &str) -> Result<Self> {
        let path = dir.join(format!("{key}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err(&path))?;
        Ok(Self { file, path })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}
