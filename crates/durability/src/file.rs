//! Crash-safe file primitives
//!
//! Uses the write-fsync-rename pattern for every durable write:
//! 1. Write to a temporary sibling (`<name>.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename to the final path
//! 4. fsync the parent directory
//!
//! Either the complete file exists or it doesn't. Steps 2 and 4 are skipped
//! under [`DurabilityMode::Os`].

use crate::mode::DurabilityMode;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix of temporary files left behind by an interrupted write
pub const TEMP_SUFFIX: &str = ".tmp";

/// Temporary sibling used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

/// Durably replace the contents of `path` with `bytes`
///
/// Returns only once the write is as durable as `mode` promises.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: DurabilityMode) -> io::Result<()> {
    let temp = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp)?;
        file.write_all(bytes)?;
        if mode.requires_fsync() {
            file.sync_all()?;
        }
    }
    rename_durable(&temp, path, mode)
}

/// Atomically rename `from` over `to`
pub fn rename_durable(from: &Path, to: &Path, mode: DurabilityMode) -> io::Result<()> {
    fs::rename(from, to)?;
    if mode.requires_fsync() {
        if let Some(parent) = to.parent() {
            sync_dir(parent)?;
        }
    }
    Ok(())
}

/// Remove a file, treating "already gone" as success
///
/// Returns whether a file was actually removed.
pub fn remove_if_exists(path: &Path, mode: DurabilityMode) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            if mode.requires_fsync() {
                if let Some(parent) = path.parent() {
                    sync_dir(parent)?;
                }
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// fsync a directory so that renames and removals inside it are durable
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Directory fsync is not available on this platform
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
