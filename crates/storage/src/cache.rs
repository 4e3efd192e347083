//! Per-bucket object cache
//!
//! Identity map from OID to the single in-memory instance of a record. Two
//! lookups of the same OID return the same [`CachedRecord`] until the entry
//! is invalidated, and a swizzle refreshes that instance in place so every
//! holder observes the committed content.

use dashmap::DashMap;
use lxp_core::{Oid, Record, Result, TypeId, Value};
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// The in-memory instance of a persistent record
///
/// Read-only to callers: changes go through `Bucket::update` inside a
/// transaction and become visible here when the transaction commits.
#[derive(Debug)]
pub struct CachedRecord {
    oid: Oid,
    record: RwLock<Record>,
}

impl CachedRecord {
    fn new(oid: Oid, record: Record) -> Self {
        CachedRecord {
            oid,
            record: RwLock::new(record),
        }
    }

    /// OID of the record
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Borrow the current content
    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.record.read()
    }

    /// Clone the current content
    ///
    /// The clone is a detached record: edit it and pass it to
    /// `Bucket::update` to stage a change.
    pub fn snapshot(&self) -> Record {
        self.record.read().clone()
    }

    /// Clone the value under `label`
    pub fn get(&self, label: &str) -> Result<Value> {
        self.record.read().get(label).cloned()
    }

    /// Type label of the current content
    pub fn type_label(&self) -> Option<TypeId> {
        self.record.read().type_label()
    }

    fn replace(&self, record: Record) {
        *self.record.write() = record;
    }
}

/// OID → instance identity map
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: DashMap<Oid, Arc<CachedRecord>>,
}

impl ObjectCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached instance for `oid`, if loaded
    pub fn get(&self, oid: Oid) -> Option<Arc<CachedRecord>> {
        self.entries.get(&oid).map(|e| Arc::clone(e.value()))
    }

    /// Insert a freshly loaded record unless another loader got there first
    ///
    /// Returns whichever instance ends up cached, so concurrent misses on
    /// the same OID still share one instance.
    pub fn insert_if_absent(&self, oid: Oid, record: Record) -> Arc<CachedRecord> {
        let entry = self
            .entries
            .entry(oid)
            .or_insert_with(|| Arc::new(CachedRecord::new(oid, record)));
        Arc::clone(entry.value())
    }

    /// Replace the content of a cached instance in place
    ///
    /// Returns false (and caches nothing) if `oid` was not loaded.
    pub fn refresh(&self, oid: Oid, record: Record) -> bool {
        match self.entries.get(&oid) {
            Some(entry) => {
                entry.value().replace(record);
                true
            }
            None => false,
        }
    }

    /// Drop the instance for `oid`
    pub fn invalidate(&self, oid: Oid) -> bool {
        self.entries.remove(&oid).is_some()
    }

    /// Drop every instance, forcing reloads from durable storage
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of loaded instances
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is loaded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
