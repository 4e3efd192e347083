//! The store: root of the persistent object graph
//!
//! A [`Store`] owns the directory layout, the exclusive process lock, the
//! OID allocator, the type registry and every repository. It is cheap to
//! clone; all clones share one [`StoreInner`].
//!
//! ## Opening
//!
//! ```text
//! 1. Create the directory layout
//! 2. Take the exclusive process lock
//! 3. Load (or create) lxp.toml
//! 4. Open the OID allocator
//! 5. Load every repository and bucket
//! 6. Ensure _transactions/Transactions and _types/Types exist
//! 7. Load published structural types
//! ```
//!
//! Opening does not run transaction recovery; that is the transaction
//! manager's job and must happen before any transaction starts.

use crate::allocator::OidAllocator;
use crate::bucket::{Bucket, BucketKind};
use crate::cache::CachedRecord;
use crate::config::StoreConfig;
use crate::registry::TypeRegistry;
use crate::repository::Repository;
use lxp_core::{
    validate_name, Error, ObjectRef, Oid, Record, Result, SchemaContext, StructuralType, TypeId,
};
use lxp_durability::{DurabilityMode, ProcessLock, StorePaths};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Repository holding the transaction log
pub const TRANSACTION_REPOSITORY: &str = "_transactions";

/// Bucket holding transaction start and commit records
pub const TRANSACTION_BUCKET: &str = "Transactions";

/// Repository holding published structural types
pub const TYPE_REPOSITORY: &str = "_types";

/// Bucket holding published structural types
pub const TYPE_BUCKET: &str = "Types";

/// Prefix of repository names reserved for the store itself
pub const RESERVED_REPOSITORY_PREFIX: char = '_';

/// Shared state behind every [`Store`] handle
pub struct StoreInner {
    paths: StorePaths,
    config: StoreConfig,
    durability: DurabilityMode,
    default_kind: BucketKind,
    allocator: OidAllocator,
    repositories: RwLock<BTreeMap<String, Arc<Repository>>>,
    types: TypeRegistry,
    _lock: ProcessLock,
}

impl StoreInner {
    /// The store-wide OID allocator
    pub fn allocator(&self) -> &OidAllocator {
        &self.allocator
    }

    /// Published structural types
    pub fn type_registry(&self) -> &TypeRegistry {
        &self.types
    }

    /// Look up a bucket by repository and bucket name
    pub fn bucket(&self, repository: &str, bucket: &str) -> Result<Arc<Bucket>> {
        let repo = self.repositories.read().get(repository).cloned().ok_or_else(|| {
            Error::Bucket(format!("repository '{}' does not exist", repository))
        })?;
        repo.get_bucket(bucket)
    }

    /// Check whether any bucket in the store holds `oid`
    pub fn oid_in_use(&self, oid: Oid) -> bool {
        self.repositories
            .read()
            .values()
            .flat_map(|repo| repo.buckets())
            .any(|bucket| bucket.contains(oid))
    }
}

impl SchemaContext for StoreInner {
    fn structural_type(&self, id: TypeId) -> Option<Arc<StructuralType>> {
        self.types.get(id)
    }

    // Reads the visible content without validating it, so that checking a
    // reference never recurses into another bucket's content-type check.
    fn resolve(&self, reference: &ObjectRef) -> Option<Record> {
        let bucket = self.bucket(&reference.repository, &reference.bucket).ok()?;
        match bucket.cache().get(reference.oid) {
            Some(cached) => Some(cached.snapshot()),
            None => bucket.load_record(reference.oid).ok(),
        }
    }
}

/// Handle to an open store
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.inner.paths.root())
            .field("durability", &self.inner.durability)
            .finish()
    }
}

impl Store {
    /// Open or create the store at `path`, reading `lxp.toml`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let paths = StorePaths::from_root(path.as_ref());
        paths.create_directories()?;
        let config = StoreConfig::load_or_create(&paths.config_file())?;
        Self::open_inner(paths, config)
    }

    /// Open or create the store at `path` with an explicit configuration
    ///
    /// `lxp.toml` is neither read nor written.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let paths = StorePaths::from_root(path.as_ref());
        paths.create_directories()?;
        Self::open_inner(paths, config)
    }

    fn open_inner(paths: StorePaths, config: StoreConfig) -> Result<Self> {
        let lock = ProcessLock::acquire(&paths.lock_file())?;
        let durability = config.durability_mode()?;
        let default_kind = config.bucket_kind()?;
        let allocator = OidAllocator::open(paths.oid_file(), durability)?;

        let inner = Arc::new(StoreInner {
            paths,
            config,
            durability,
            default_kind,
            allocator,
            repositories: RwLock::new(BTreeMap::new()),
            types: TypeRegistry::new(),
            _lock: lock,
        });
        let store = Store { inner };

        store.load_repositories()?;
        store
            .ensure_repository(TRANSACTION_REPOSITORY)?
            .ensure_bucket(TRANSACTION_BUCKET, BucketKind::Indexed)?;
        let types = store
            .ensure_repository(TYPE_REPOSITORY)?
            .ensure_bucket(TYPE_BUCKET, BucketKind::Indexed)?;
        store.inner.types.load(&types)?;

        info!(
            target: "lxp::store",
            root = %store.inner.paths.root().display(),
            durability = %durability,
            repositories = store.inner.repositories.read().len(),
            types = store.inner.types.len(),
            "Store opened"
        );
        Ok(store)
    }

    fn load_repositories(&self) -> Result<()> {
        let mut loaded = BTreeMap::new();
        for entry in std::fs::read_dir(self.inner.paths.repos_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let repo = self.open_repository(&name)?;
            loaded.insert(name, repo);
        }
        *self.inner.repositories.write() = loaded;
        Ok(())
    }

    fn open_repository(&self, name: &str) -> Result<Arc<Repository>> {
        Ok(Arc::new(Repository::open(
            name,
            self.inner.paths.clone(),
            self.inner.durability,
            self.inner.default_kind,
            Arc::downgrade(&self.inner),
        )?))
    }

    fn ensure_repository(&self, name: &str) -> Result<Arc<Repository>> {
        if let Some(repo) = self.inner.repositories.read().get(name) {
            return Ok(Arc::clone(repo));
        }
        let repo = self.open_repository(name)?;
        self.inner
            .repositories
            .write()
            .insert(name.to_string(), Arc::clone(&repo));
        Ok(repo)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Shared state, for layers that hold a [`SchemaContext`]
    pub fn inner(&self) -> &Arc<StoreInner> {
        &self.inner
    }

    /// Directory layout
    pub fn paths(&self) -> &StorePaths {
        &self.inner.paths
    }

    /// Effective configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Durability mode of every write
    pub fn durability(&self) -> DurabilityMode {
        self.inner.durability
    }

    /// Allocate a fresh OID from the store-wide allocator
    pub fn allocate_oid(&self) -> Result<Oid> {
        self.inner.allocator.allocate()
    }

    /// Published structural types
    pub fn type_registry(&self) -> &TypeRegistry {
        &self.inner.types
    }

    // ========================================================================
    // Repositories
    // ========================================================================

    /// Create a user repository
    ///
    /// # Errors
    /// - `IllegalKey` for an invalid or reserved (`_`-prefixed) name
    /// - `Bucket` if the repository exists
    pub fn create_repository(&self, name: &str) -> Result<Arc<Repository>> {
        validate_name(name)?;
        if name.starts_with(RESERVED_REPOSITORY_PREFIX) {
            return Err(Error::IllegalKey(format!(
                "repository name '{}' is reserved",
                name
            )));
        }
        if self.repository_exists(name) {
            return Err(Error::Bucket(format!("repository '{}' already exists", name)));
        }
        let repo = self.ensure_repository(name)?;
        info!(target: "lxp::store", repository = name, "Repository created");
        Ok(repo)
    }

    /// Look up a repository
    pub fn get_repository(&self, name: &str) -> Result<Arc<Repository>> {
        self.inner
            .repositories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Bucket(format!("repository '{}' does not exist", name)))
    }

    /// Check whether a repository exists
    pub fn repository_exists(&self, name: &str) -> bool {
        self.inner.repositories.read().contains_key(name)
    }

    /// Delete a user repository with all its buckets and records
    pub fn delete_repository(&self, name: &str) -> Result<()> {
        if name.starts_with(RESERVED_REPOSITORY_PREFIX) {
            return Err(Error::IllegalKey(format!(
                "repository '{}' is reserved and cannot be deleted",
                name
            )));
        }
        let repo = self
            .inner
            .repositories
            .write()
            .remove(name)
            .ok_or_else(|| Error::Bucket(format!("repository '{}' does not exist", name)))?;
        repo.destroy()?;
        info!(target: "lxp::store", repository = name, "Repository deleted");
        Ok(())
    }

    /// Repository names, sorted, reserved repositories included
    pub fn repository_names(&self) -> Vec<String> {
        self.inner.repositories.read().keys().cloned().collect()
    }

    /// All repositories, sorted by name
    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.inner.repositories.read().values().cloned().collect()
    }

    // ========================================================================
    // Buckets and objects
    // ========================================================================

    /// Look up a bucket by repository and bucket name
    pub fn bucket(&self, repository: &str, bucket: &str) -> Result<Arc<Bucket>> {
        self.inner.bucket(repository, bucket)
    }

    /// Every bucket in the store, reserved ones included
    pub fn all_buckets(&self) -> Vec<Arc<Bucket>> {
        self.repositories()
            .iter()
            .flat_map(|repo| repo.buckets())
            .collect()
    }

    /// The log bucket holding transaction start and commit records
    pub fn transaction_log(&self) -> Result<Arc<Bucket>> {
        self.inner.bucket(TRANSACTION_REPOSITORY, TRANSACTION_BUCKET)
    }

    /// The bucket holding published structural types
    pub fn type_bucket(&self) -> Result<Arc<Bucket>> {
        self.inner.bucket(TYPE_REPOSITORY, TYPE_BUCKET)
    }

    /// Fetch the cached instance of the object `reference` addresses
    pub fn get_object(&self, reference: &ObjectRef) -> Result<Arc<CachedRecord>> {
        self.bucket(&reference.repository, &reference.bucket)?
            .get_object_by_id(reference.oid)
    }
}

impl SchemaContext for Store {
    fn structural_type(&self, id: TypeId) -> Option<Arc<StructuralType>> {
        self.inner.structural_type(id)
    }

    fn resolve(&self, reference: &ObjectRef) -> Option<Record> {
        self.inner.resolve(reference)
    }
}
