//! Durability layer for the LXP store
//!
//! This crate handles the primitives that touch disk:
//!
//! - Durability modes: Always (fsync every write), Os
//! - Crash-safe write-fsync-rename and idempotent removal
//! - The on-disk directory layout of a store and its buckets
//! - The exclusive process lock

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;
pub mod lock;
pub mod mode;
pub mod paths;

pub use file::{remove_if_exists, rename_durable, sync_dir, write_atomic, TEMP_SUFFIX};
pub use lock::ProcessLock;
pub use mode::DurabilityMode;
pub use paths::{BucketPaths, FileRole, StorePaths, CONFIG_FILE_NAME, SHADOW_SUFFIX};
