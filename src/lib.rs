//! LXP store: a persistent, transactional store of semi-structured records
//!
//! Records are labelled cross-products (label → value maps) kept in
//! OID-indexed buckets, grouped into repositories. Updates are staged as
//! shadows under an explicit transaction and become visible atomically at
//! commit; a crash after the commit record is durable is completed by
//! roll-forward recovery on the next open.
//!
//! # Quick Start
//!
//! ```ignore
//! use lxpstore::{Database, Record};
//!
//! let db = Database::open("/path/to/store")?;
//! let people = db.store().create_repository("people")?.create_bucket("all")?;
//!
//! let oid = people.make_persistent(&mut Record::new().with("name", "Ada")?)?;
//!
//! db.transactions().with_transaction(|txn| {
//!     let mut ada = people.get_object_by_id(oid)?.snapshot();
//!     ada.put("age", 36)?;
//!     people.update(txn, &ada)
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `lxp-core`: values, records, structural types, JSON codec, errors
//! - `lxp-durability`: durable file primitives and the directory layout
//! - `lxp-storage`: store, repositories, buckets, caches, type registry
//! - `lxp-concurrency`: transactions, commit protocol, recovery

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use lxp_concurrency::testing::CrashPoint;
pub use lxp_concurrency::{
    RecoveryStats, Transaction, TransactionManager, TransactionState,
};
pub use lxp_core::json;
pub use lxp_core::{
    check_label_consistency, check_structural_consistency, Error, ErrorKind, Kind, ObjectRef, Oid,
    Record, Result, SchemaContext, StructuralType, TxnId, TypeId, Value, ValueKind,
};
pub use lxp_durability::DurabilityMode;
pub use lxp_storage::{
    Bucket, BucketKind, CachedRecord, Repository, Store, StoreConfig, TypeRegistry,
};

/// An open store with recovery done and its transaction manager ready
pub struct Database {
    transactions: TransactionManager,
}

impl Database {
    /// Open or create the store at `path`, reading `lxp.toml`, and recover
    ///
    /// # Errors
    /// - `Config` for an invalid `lxp.toml`
    /// - `Bucket` if another process holds the store
    /// - `Corruption` if the transaction log cannot be read
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_store(Store::open(path)?)
    }

    /// Open or create the store at `path` with an explicit configuration
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::from_store(Store::open_with_config(path, config)?)
    }

    fn from_store(store: Store) -> Result<Self> {
        let transactions = TransactionManager::open(store)?;
        let stats = transactions.last_recovery();
        if !stats.is_clean() {
            info!(
                target: "lxp::db",
                commits_replayed = stats.commits_replayed,
                records_discarded = stats.records_discarded,
                shadows_removed = stats.shadows_removed,
                "Store recovered from interrupted transactions"
            );
        }
        Ok(Database { transactions })
    }

    /// The underlying store
    pub fn store(&self) -> &Store {
        self.transactions.store()
    }

    /// The transaction manager
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Statistics of the recovery pass run at open
    pub fn last_recovery(&self) -> &RecoveryStats {
        self.transactions.last_recovery()
    }

    /// Look up a repository
    pub fn repository(&self, name: &str) -> Result<Arc<Repository>> {
        self.store().get_repository(name)
    }

    /// Look up a bucket
    pub fn bucket(&self, repository: &str, bucket: &str) -> Result<Arc<Bucket>> {
        self.store().bucket(repository, bucket)
    }

    /// Fetch the object addressed by a `repo/bucket/oid` handle
    pub fn resolve_handle(&self, handle: &str) -> Result<Arc<CachedRecord>> {
        self.store().get_object(&ObjectRef::parse_handle(handle)?)
    }

    /// Begin a transaction
    pub fn begin(&self) -> Result<Arc<Transaction>> {
        self.transactions.begin()
    }

    /// Commit a transaction
    pub fn commit(&self, txn: &Transaction) -> Result<()> {
        self.transactions.commit(txn)
    }

    /// Roll back a transaction
    pub fn rollback(&self, txn: &Transaction) -> Result<()> {
        self.transactions.rollback(txn)
    }
}
