//! Buckets
//!
//! A [`Bucket`] is a named, OID-indexed collection of records inside a
//! repository. It owns an [`ObjectCache`] and exposes the primitives the
//! transaction layer builds on:
//!
//! - `get_object_by_id`: cache first, then durable storage (validated)
//! - `make_persistent`: allocate OID, write durably, index
//! - `update`: stage a shadow under an active transaction
//! - `delete`: remove from index and storage
//! - `swizzle` / `cleanup`: promote / discard a shadow (idempotent)
//! - `tidy_up_transaction_data`: startup sweep of orphaned shadows
//!
//! ## Shadow ownership
//!
//! At most one transaction may hold the shadow of an OID. `update` claims
//! the OID for its transaction; a second active transaction updating the
//! same OID fails with `WriteConflict`. The claim is released by `swizzle`,
//! `cleanup` or `delete`.

use crate::cache::{CachedRecord, ObjectCache};
use crate::store::StoreInner;
use lxp_core::json::{decode_record_slice, encode_record_bytes};
use lxp_core::{
    check_label_consistency, check_structural_consistency, Error, ObjectRef, Oid, Record, Result,
    TransactionScope, TxnId, TypeId,
};
use lxp_durability::{
    remove_if_exists, rename_durable, write_atomic, BucketPaths, DurabilityMode, FileRole,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Lookup strategy of a bucket
///
/// Affects only lookup performance, never the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// Existence and enumeration answered from the filesystem
    #[default]
    Directory,
    /// In-memory sorted OID index, loaded at open
    Indexed,
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKind::Directory => f.write_str("directory"),
            BucketKind::Indexed => f.write_str("indexed"),
        }
    }
}

impl FromStr for BucketKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "directory" => Ok(BucketKind::Directory),
            "indexed" => Ok(BucketKind::Indexed),
            other => Err(Error::Config(format!(
                "invalid bucket kind '{}', expected \"directory\" or \"indexed\"",
                other
            ))),
        }
    }
}

/// Persisted bucket metadata (`.bucket`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BucketMeta {
    pub kind: BucketKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<TypeId>,
}

/// A named, OID-indexed collection of records
pub struct Bucket {
    repository: String,
    name: String,
    paths: BucketPaths,
    kind: BucketKind,
    content_type: Option<TypeId>,
    durability: DurabilityMode,
    cache: ObjectCache,
    /// Present for `BucketKind::Indexed` only
    index: Option<RwLock<BTreeSet<Oid>>>,
    shadow_owners: Mutex<HashMap<Oid, TxnId>>,
    store: Weak<StoreInner>,
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("repository", &self.repository)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Bucket {
    /// Create the bucket directory and metadata
    pub(crate) fn create(
        repository: &str,
        name: &str,
        paths: BucketPaths,
        meta: BucketMeta,
        durability: DurabilityMode,
        store: Weak<StoreInner>,
    ) -> Result<Self> {
        std::fs::create_dir_all(paths.dir())?;
        let bytes = serde_json::to_vec_pretty(&meta)?;
        write_atomic(&paths.meta(), &bytes, durability)?;
        Self::from_meta(repository, name, paths, meta, durability, store)
    }

    /// Open an existing bucket directory
    pub(crate) fn open(
        repository: &str,
        name: &str,
        paths: BucketPaths,
        durability: DurabilityMode,
        store: Weak<StoreInner>,
    ) -> Result<Self> {
        let bytes = std::fs::read(paths.meta())?;
        let meta: BucketMeta = serde_json::from_slice(&bytes).map_err(|e| {
            Error::Corruption(format!(
                "bucket metadata {} unreadable: {}",
                paths.meta().display(),
                e
            ))
        })?;
        Self::from_meta(repository, name, paths, meta, durability, store)
    }

    fn from_meta(
        repository: &str,
        name: &str,
        paths: BucketPaths,
        meta: BucketMeta,
        durability: DurabilityMode,
        store: Weak<StoreInner>,
    ) -> Result<Self> {
        let mut bucket = Bucket {
            repository: repository.to_string(),
            name: name.to_string(),
            paths,
            kind: meta.kind,
            content_type: meta.content_type,
            durability,
            cache: ObjectCache::new(),
            index: None,
            shadow_owners: Mutex::new(HashMap::new()),
            store,
        };
        if bucket.kind == BucketKind::Indexed {
            let oids = bucket.scan_records()?;
            bucket.index = Some(RwLock::new(oids));
        }
        Ok(bucket)
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Repository this bucket belongs to
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Bucket name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `repo/bucket`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.repository, self.name)
    }

    /// Address of `oid` in this bucket
    pub fn object_ref(&self, oid: Oid) -> ObjectRef {
        ObjectRef::new(self.repository.clone(), self.name.clone(), oid)
    }

    /// Lookup strategy
    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    /// Structural type every record must satisfy, if declared
    pub fn content_type(&self) -> Option<TypeId> {
        self.content_type
    }

    /// The bucket's object cache
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    fn store(&self) -> Result<Arc<StoreInner>> {
        self.store
            .upgrade()
            .ok_or_else(|| Error::Bucket(format!("store of {} has been closed", self.qualified_name())))
    }

    fn not_found(&self, oid: Oid) -> Error {
        Error::ObjectNotFound {
            bucket: self.qualified_name(),
            oid,
        }
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Check whether `oid` has a visible record here
    pub fn contains(&self, oid: Oid) -> bool {
        match &self.index {
            Some(index) => index.read().contains(&oid),
            None => self.paths.record(oid).is_file(),
        }
    }

    /// All OIDs with a visible record, ascending
    pub fn oids(&self) -> Result<Vec<Oid>> {
        match &self.index {
            Some(index) => Ok(index.read().iter().copied().collect()),
            None => Ok(self.scan_records()?.into_iter().collect()),
        }
    }

    /// Number of visible records
    pub fn len(&self) -> Result<usize> {
        match &self.index {
            Some(index) => Ok(index.read().len()),
            None => Ok(self.scan_records()?.len()),
        }
    }

    /// True if the bucket holds no records
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn scan_records(&self) -> Result<BTreeSet<Oid>> {
        let mut oids = BTreeSet::new();
        for entry in std::fs::read_dir(self.paths.dir())? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let FileRole::Record(oid) = FileRole::classify(name) {
                    oids.insert(oid);
                }
            }
        }
        Ok(oids)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The single in-memory instance of `oid`
    ///
    /// Consults the cache first; on a miss loads the record from durable
    /// storage, validates it against the declared content type, and caches
    /// it. Repeated calls return the identical instance until the entry is
    /// invalidated.
    ///
    /// # Errors
    /// - `ObjectNotFound` if the OID is absent
    /// - `Bucket` if the stored record fails content-type validation
    pub fn get_object_by_id(&self, oid: Oid) -> Result<Arc<CachedRecord>> {
        if let Some(cached) = self.cache.get(oid) {
            return Ok(cached);
        }
        if !self.contains(oid) {
            return Err(self.not_found(oid));
        }

        let record = self.load_record(oid)?;
        if let Some(type_id) = self.content_type {
            let store = self.store()?;
            if let Err(e) = self.validate_content(&store, type_id, &record) {
                return Err(Error::Bucket(format!(
                    "record {} in {} failed validation: {}",
                    oid,
                    self.qualified_name(),
                    e
                )));
            }
        }
        Ok(self.cache.insert_if_absent(oid, record))
    }

    /// Read the visible record from durable storage, bypassing the cache
    pub fn load_record(&self, oid: Oid) -> Result<Record> {
        match self.read_file(&self.paths.record(oid), oid)? {
            Some(record) => Ok(record),
            None => Err(self.not_found(oid)),
        }
    }

    /// Read the staged shadow for `oid`, if one exists
    pub fn load_shadow(&self, oid: Oid) -> Result<Option<Record>> {
        self.read_file(&self.paths.shadow(oid), oid)
    }

    /// Check whether a shadow is staged for `oid`
    pub fn has_shadow(&self, oid: Oid) -> bool {
        self.paths.shadow(oid).is_file()
    }

    /// Transaction currently holding the shadow of `oid`
    pub fn shadow_holder(&self, oid: Oid) -> Option<TxnId> {
        self.shadow_owners.lock().get(&oid).copied()
    }

    fn read_file(&self, path: &std::path::Path, oid: Oid) -> Result<Option<Record>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut record = decode_record_slice(&bytes).map_err(|e| {
            Error::Corruption(format!("{} is not a record: {}", path.display(), e))
        })?;
        match record.oid() {
            Some(stored) if stored != oid => {
                return Err(Error::Corruption(format!(
                    "{} holds OID {} but is filed under {}",
                    path.display(),
                    stored,
                    oid
                )));
            }
            Some(_) => {}
            None => record.set_oid(oid),
        }
        Ok(Some(record))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Durably insert a new record
    ///
    /// Allocates the record's OID from the store unless one is already set,
    /// writes the record, and registers it in the bucket. Returns only after
    /// the write is durable.
    ///
    /// # Errors
    /// - `Bucket` if the OID is already in use
    /// - `TypeMismatch` if the record fails the declared content type
    pub fn make_persistent(&self, record: &mut Record) -> Result<Oid> {
        let store = self.store()?;
        if let Some(type_id) = self.content_type {
            self.validate_content(&store, type_id, record)?;
        }

        let oid = match record.oid() {
            Some(oid) => {
                if store.oid_in_use(oid) {
                    return Err(Error::Bucket(format!(
                        "OID collision: {} is already in use",
                        oid
                    )));
                }
                store.allocator().observe(oid)?;
                oid
            }
            None => store.allocator().allocate()?,
        };
        record.set_oid(oid);

        write_atomic(
            &self.paths.record(oid),
            &encode_record_bytes(record)?,
            self.durability,
        )?;
        if let Some(index) = &self.index {
            index.write().insert(oid);
        }
        // A stale entry can only exist if the OID was deleted and re-used.
        self.cache.invalidate(oid);

        debug!(target: "lxp::bucket", bucket = %self.qualified_name(), oid = %oid, "Record persisted");
        Ok(oid)
    }

    /// Stage new content for an existing record under `txn`
    ///
    /// The content is written as a shadow and is not visible until the
    /// transaction commits. The (bucket, OID) pair is registered with the
    /// transaction once, however many times it is updated.
    ///
    /// # Errors
    /// - `Bucket` if `txn` is not active or the record has no OID
    /// - `ObjectNotFound` if the OID is absent from this bucket
    /// - `TypeMismatch` if the content fails the declared content type
    /// - `WriteConflict` if another transaction holds this OID's shadow
    pub fn update(&self, txn: &dyn TransactionScope, record: &Record) -> Result<()> {
        if !txn.is_active() {
            return Err(Error::Bucket(format!(
                "update of {} requires an active transaction",
                self.qualified_name()
            )));
        }
        let oid = record.oid().ok_or_else(|| {
            Error::Bucket("cannot update a record that has no OID".to_string())
        })?;
        if !self.contains(oid) {
            return Err(self.not_found(oid));
        }
        if let Some(type_id) = self.content_type {
            let store = self.store()?;
            self.validate_content(&store, type_id, record)?;
        }

        let bytes = encode_record_bytes(record)?;
        let txn_id = txn.txn_id();
        let newly_claimed = {
            let mut owners = self.shadow_owners.lock();
            match owners.get(&oid) {
                Some(holder) if *holder != txn_id => {
                    return Err(Error::WriteConflict {
                        object: self.object_ref(oid).to_string(),
                        holder: *holder,
                    });
                }
                Some(_) => false,
                None => {
                    owners.insert(oid, txn_id);
                    true
                }
            }
        };

        let shadow = self.paths.shadow(oid);
        let staged = txn.stage(self.object_ref(oid), &mut || {
            write_atomic(&shadow, &bytes, self.durability)?;
            Ok(())
        });
        if newly_claimed && !matches!(staged, Ok(true)) {
            self.release_claim(oid, txn_id);
        }
        if !staged? {
            return Err(Error::Bucket(format!(
                "transaction {} closed before its update of {} was staged",
                txn_id,
                self.object_ref(oid)
            )));
        }
        debug!(target: "lxp::bucket", bucket = %self.qualified_name(), oid = %oid, txn_id = %txn_id, "Shadow staged");
        Ok(())
    }

    /// Remove a record from the index and from storage
    ///
    /// Any staged shadow for the OID is discarded with it.
    pub fn delete(&self, oid: Oid) -> Result<()> {
        if !self.contains(oid) {
            return Err(self.not_found(oid));
        }
        remove_if_exists(&self.paths.record(oid), self.durability)?;
        remove_if_exists(&self.paths.shadow(oid), self.durability)?;
        self.shadow_owners.lock().remove(&oid);
        if let Some(index) = &self.index {
            index.write().remove(&oid);
        }
        self.cache.invalidate(oid);
        debug!(target: "lxp::bucket", bucket = %self.qualified_name(), oid = %oid, "Record deleted");
        Ok(())
    }

    // ========================================================================
    // Transaction-manager primitives
    // ========================================================================

    /// Promote the shadow of `oid` to be the visible record
    ///
    /// Refreshes the cached instance in place so existing holders and later
    /// lookups observe the new content. Idempotent: with no shadow staged,
    /// only the cache is re-synchronised with durable storage.
    ///
    /// The write claim on `oid` is kept. The committing transaction releases
    /// it with [`release_claim`](Self::release_claim) once its commit record
    /// is gone, since until then recovery may swizzle `oid` again.
    pub fn swizzle(&self, oid: Oid) -> Result<()> {
        let shadow = self.paths.shadow(oid);
        let record_path = self.paths.record(oid);
        if shadow.is_file() {
            rename_durable(&shadow, &record_path, self.durability)?;
            if let Some(index) = &self.index {
                index.write().insert(oid);
            }
        }

        match self.read_file(&record_path, oid)? {
            Some(record) => {
                self.cache.refresh(oid, record);
            }
            None => {
                self.cache.invalidate(oid);
            }
        }
        Ok(())
    }

    /// Discard the shadow of `oid` without touching the visible record
    ///
    /// Idempotent.
    pub fn cleanup(&self, oid: Oid) -> Result<()> {
        remove_if_exists(&self.paths.shadow(oid), self.durability)?;
        self.shadow_owners.lock().remove(&oid);
        Ok(())
    }

    /// Drop `txn_id`'s write claim on `oid`
    ///
    /// A claim held by another transaction is left alone.
    pub fn release_claim(&self, oid: Oid, txn_id: TxnId) {
        let mut owners = self.shadow_owners.lock();
        if owners.get(&oid) == Some(&txn_id) {
            owners.remove(&oid);
        }
    }

    /// Remove every shadow and interrupted-write artifact in this bucket
    ///
    /// Only for startup recovery, before any transaction can be active.
    /// Returns the number of files removed.
    pub fn tidy_up_transaction_data(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(self.paths.dir())? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            match FileRole::classify(&name) {
                FileRole::Shadow(_) | FileRole::Temp => {
                    if remove_if_exists(&entry.path(), self.durability)? {
                        removed += 1;
                    }
                }
                FileRole::Unknown => {
                    warn!(target: "lxp::bucket", bucket = %self.qualified_name(), file = %name, "Unrecognised file in bucket directory");
                }
                FileRole::Record(_) | FileRole::Meta => {}
            }
        }
        self.shadow_owners.lock().clear();
        Ok(removed)
    }

    /// Drop all cached instances, forcing reloads from durable storage
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// Remove the bucket directory
    pub(crate) fn destroy(&self) -> Result<()> {
        self.cache.clear();
        std::fs::remove_dir_all(self.paths.dir())?;
        Ok(())
    }

    fn validate_content(&self, store: &StoreInner, type_id: TypeId, record: &Record) -> Result<()> {
        let ty = store.type_registry().get(type_id).ok_or_else(|| {
            Error::Bucket(format!(
                "content type {} of {} is not registered",
                type_id,
                self.qualified_name()
            ))
        })?;
        if !check_structural_consistency(record, &ty, store) {
            return Err(Error::TypeMismatch(format!(
                "record does not satisfy type '{}' required by {}",
                ty.name(),
                self.qualified_name()
            )));
        }
        if !check_label_consistency(record, type_id, store) {
            return Err(Error::TypeMismatch(format!(
                "record's type label is incompatible with type '{}' required by {}",
                ty.name(),
                self.qualified_name()
            )));
        }
        Ok(())
    }
}
