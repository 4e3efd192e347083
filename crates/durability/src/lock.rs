//! Exclusive process lock on a store directory
//!
//! Two processes writing the same store would interleave shadows and log
//! records. The lock is held for the lifetime of the [`ProcessLock`] and
//! released on drop.

use fs2::FileExt;
use lxp_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Held exclusive lock on a store directory
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
}

impl ProcessLock {
    /// Acquire the lock at `path`, failing immediately if another process holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| {
            Error::Bucket(format!(
                "store at '{}' is already in use by another process",
                path.parent().unwrap_or(path).display()
            ))
        })?;
        Ok(ProcessLock { file })
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
