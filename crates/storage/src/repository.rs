//! Repositories: named containers of buckets

use crate::bucket::{Bucket, BucketKind, BucketMeta};
use crate::store::StoreInner;
use lxp_core::{validate_name, Error, Result, TypeId};
use lxp_durability::{DurabilityMode, StorePaths};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::info;

/// A named container of buckets
pub struct Repository {
    name: String,
    paths: StorePaths,
    durability: DurabilityMode,
    default_kind: BucketKind,
    buckets: RwLock<BTreeMap<String, Arc<Bucket>>>,
    store: Weak<StoreInner>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("buckets", &self.buckets.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Repository {
    /// Open (creating if needed) the repository directory and load its buckets
    pub(crate) fn open(
        name: &str,
        paths: StorePaths,
        durability: DurabilityMode,
        default_kind: BucketKind,
        store: Weak<StoreInner>,
    ) -> Result<Self> {
        let dir = paths.repository_dir(name);
        std::fs::create_dir_all(&dir)?;

        let mut buckets = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(bucket_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let bucket = Bucket::open(
                name,
                &bucket_name,
                paths.bucket(name, &bucket_name),
                durability,
                store.clone(),
            )?;
            buckets.insert(bucket_name, Arc::new(bucket));
        }

        Ok(Repository {
            name: name.to_string(),
            paths,
            durability,
            default_kind,
            buckets: RwLock::new(buckets),
            store,
        })
    }

    /// Repository name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a bucket of the store's default kind with no content type
    pub fn create_bucket(&self, name: &str) -> Result<Arc<Bucket>> {
        self.create_bucket_with(name, self.default_kind, None)
    }

    /// Create a bucket with an explicit kind and optional content type
    ///
    /// # Errors
    /// - `IllegalKey` for an invalid name
    /// - `Bucket` if the bucket exists or the content type is not registered
    pub fn create_bucket_with(
        &self,
        name: &str,
        kind: BucketKind,
        content_type: Option<TypeId>,
    ) -> Result<Arc<Bucket>> {
        validate_name(name)?;
        if let Some(type_id) = content_type {
            let store = self
                .store
                .upgrade()
                .ok_or_else(|| Error::Bucket("store has been closed".to_string()))?;
            if store.type_registry().get(type_id).is_none() {
                return Err(Error::Bucket(format!(
                    "content type {} is not registered",
                    type_id
                )));
            }
        }

        let mut buckets = self.buckets.write();
        if buckets.contains_key(name) {
            return Err(Error::Bucket(format!(
                "bucket {}/{} already exists",
                self.name, name
            )));
        }
        let bucket = Arc::new(Bucket::create(
            &self.name,
            name,
            self.paths.bucket(&self.name, name),
            BucketMeta { kind, content_type },
            self.durability,
            self.store.clone(),
        )?);
        buckets.insert(name.to_string(), Arc::clone(&bucket));

        info!(target: "lxp::store", repository = %self.name, bucket = name, kind = %kind, "Bucket created");
        Ok(bucket)
    }

    /// Look up a bucket
    ///
    /// # Errors
    /// `Bucket` if no such bucket exists.
    pub fn get_bucket(&self, name: &str) -> Result<Arc<Bucket>> {
        self.buckets.read().get(name).cloned().ok_or_else(|| {
            Error::Bucket(format!("bucket {}/{} does not exist", self.name, name))
        })
    }

    /// Check whether a bucket exists
    pub fn bucket_exists(&self, name: &str) -> bool {
        self.buckets.read().contains_key(name)
    }

    /// Delete a bucket and every record in it
    pub fn delete_bucket(&self, name: &str) -> Result<()> {
        let bucket = self.buckets.write().remove(name).ok_or_else(|| {
            Error::Bucket(format!("bucket {}/{} does not exist", self.name, name))
        })?;
        bucket.destroy()?;
        info!(target: "lxp::store", repository = %self.name, bucket = name, "Bucket deleted");
        Ok(())
    }

    /// Bucket names, sorted
    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.read().keys().cloned().collect()
    }

    /// All buckets, sorted by name
    pub fn buckets(&self) -> Vec<Arc<Bucket>> {
        self.buckets.read().values().cloned().collect()
    }

    /// Get the bucket, creating it with the given shape if absent
    pub(crate) fn ensure_bucket(
        &self,
        name: &str,
        kind: BucketKind,
    ) -> Result<Arc<Bucket>> {
        if let Ok(bucket) = self.get_bucket(name) {
            return Ok(bucket);
        }
        self.create_bucket_with(name, kind, None)
    }

    pub(crate) fn destroy(&self) -> Result<()> {
        let buckets = std::mem::take(&mut *self.buckets.write());
        for bucket in buckets.values() {
            bucket.invalidate_cache();
        }
        std::fs::remove_dir_all(self.paths.repository_dir(&self.name))?;
        Ok(())
    }
}
