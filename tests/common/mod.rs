//! Shared test utilities for the root integration suites.
//!
//! Import via `mod common;`.

#![allow(dead_code)]

use lxpstore::{Database, DurabilityMode, Oid, Record, StoreConfig};
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route library logs to the test harness output (visible with --nocapture)
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Config with OS durability, for speed
pub fn fast_config() -> StoreConfig {
    StoreConfig::default().with_durability(DurabilityMode::Os)
}

// ============================================================================
// TestDb
// ============================================================================

/// A database in its own temporary directory, reopenable in place
pub struct TestDb {
    pub db: Option<Database>,
    pub dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let db = Database::open_with_config(dir.path(), fast_config()).unwrap();
        TestDb { db: Some(db), dir }
    }

    pub fn db(&self) -> &Database {
        self.db.as_ref().unwrap()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Drop every handle and open the store again, running recovery
    pub fn reopen(&mut self) -> &Database {
        self.db = None;
        self.db = Some(Database::open_with_config(self.dir.path(), fast_config()).unwrap());
        self.db()
    }
}

pub fn person(name: &str, age: i32) -> Record {
    Record::new()
        .with("name", name)
        .unwrap()
        .with("age", age)
        .unwrap()
}

pub fn age(db: &Database, repo: &str, bucket: &str, oid: Oid) -> i32 {
    db.bucket(repo, bucket)
        .unwrap()
        .get_object_by_id(oid)
        .unwrap()
        .read()
        .get_int("age")
        .unwrap()
}
