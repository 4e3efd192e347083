//! Type registry: published structural types
//!
//! Types are published as records in `_types/Types`; a type's id is the OID
//! of its record. Published types are immutable. Republishing a name yields
//! a new id, the name then resolves to the newest id, and older ids stay
//! resolvable for records labelled with them.

use crate::bucket::Bucket;
use crate::store::Store;
use dashmap::DashMap;
use lxp_core::{validate_label, Error, Result, StructuralType, TypeId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// In-memory index of published types
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_id: DashMap<TypeId, Arc<StructuralType>>,
    by_name: RwLock<HashMap<String, TypeId>>,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Load every type record from the type bucket
    pub(crate) fn load(&self, bucket: &Bucket) -> Result<()> {
        for oid in bucket.oids()? {
            let record = bucket.load_record(oid)?;
            match StructuralType::from_record(&record) {
                Ok(ty) => self.insert(Arc::new(ty.with_id(oid))),
                Err(e) => {
                    warn!(target: "lxp::store", oid = %oid, error = %e, "Skipping unreadable type record");
                }
            }
        }
        Ok(())
    }

    fn insert(&self, ty: Arc<StructuralType>) {
        let Some(id) = ty.id() else {
            return;
        };
        {
            let mut by_name = self.by_name.write();
            let newest = by_name.get(ty.name()).map_or(true, |existing| *existing < id);
            if newest {
                by_name.insert(ty.name().to_string(), id);
            }
        }
        self.by_id.insert(id, ty);
    }

    /// Type published under `id`
    pub fn get(&self, id: TypeId) -> Option<Arc<StructuralType>> {
        self.by_id.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Newest id published under `name`
    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.read().get(name).copied()
    }

    /// Newest type published under `name`
    pub fn by_name(&self, name: &str) -> Option<Arc<StructuralType>> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// Published type names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of published type ids
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True if no type has been published
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Store {
    /// Publish a structural type, returning it with its new id
    ///
    /// Any id already on `ty` is ignored; publishing always assigns a fresh one.
    ///
    /// # Errors
    /// `IllegalKey` if a label is empty or reserved.
    pub fn create_type(&self, ty: StructuralType) -> Result<Arc<StructuralType>> {
        for (label, _) in ty.fields() {
            validate_label(label)?;
        }
        let mut record = ty.to_record();
        record.clear_oid();
        let id = self.type_bucket()?.make_persistent(&mut record)?;
        let published = Arc::new(ty.with_id(id));
        self.type_registry().insert(Arc::clone(&published));
        info!(target: "lxp::store", type_id = %id, name = published.name(), "Type published");
        Ok(published)
    }

    /// Type published under `id`
    pub fn type_by_id(&self, id: TypeId) -> Result<Arc<StructuralType>> {
        self.type_registry()
            .get(id)
            .ok_or_else(|| Error::Bucket(format!("type {} is not registered", id)))
    }

    /// Newest type published under `name`
    pub fn type_by_name(&self, name: &str) -> Result<Arc<StructuralType>> {
        self.type_registry()
            .by_name(name)
            .ok_or_else(|| Error::Bucket(format!("type '{}' is not registered", name)))
    }

    /// Newest id published under `name`
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.type_registry().id_of(name)
    }

    /// Published type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        self.type_registry().names()
    }

    /// Read a JSON type descriptor file and publish it
    pub fn load_descriptor(&self, path: impl AsRef<Path>) -> Result<Arc<StructuralType>> {
        let text = std::fs::read_to_string(path.as_ref())?;
        self.create_type(StructuralType::from_descriptor_json(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::store::Store;
    use lxp_core::{Kind, StructuralType};
    use lxp_durability::DurabilityMode;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Store {
        Store::open_with_config(
            dir.path(),
            StoreConfig::default().with_durability(DurabilityMode::Os),
        )
        .unwrap()
    }

    fn person() -> StructuralType {
        StructuralType::builder("Person")
            .field("name", Kind::String)
            .field("age", Kind::Int)
            .build()
    }

    #[test]
    fn test_create_and_lookup() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let ty = store.create_type(person()).unwrap();
        let id = ty.id().unwrap();
        assert_eq!(store.type_id("Person"), Some(id));
        assert!(store.type_by_id(id).unwrap().structurally_equal(&person()));
        assert_eq!(store.type_names(), vec!["Person".to_string()]);
    }

    #[test]
    fn test_republish_gets_new_id_and_old_stays() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let v1 = store.create_type(person()).unwrap().id().unwrap();
        let v2 = store
            .create_type(
                StructuralType::builder("Person")
                    .field("name", Kind::String)
                    .build(),
            )
            .unwrap()
            .id()
            .unwrap();
        assert_ne!(v1, v2);
        assert_eq!(store.type_id("Person"), Some(v2));
        assert_eq!(store.type_by_id(v1).unwrap().len(), 2);
    }

    #[test]
    fn test_types_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = open(&dir);
            store.create_type(person()).unwrap().id().unwrap()
        };
        let store = open(&dir);
        assert_eq!(store.type_id("Person"), Some(id));
        assert_eq!(store.type_by_name("Person").unwrap().id(), Some(id));
    }

    #[test]
    fn test_load_descriptor() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let file = dir.path().join("person.json");
        std::fs::write(
            &file,
            r#"{"name": "Person", "fields": {"name": "STRING", "age": "INT"}}"#,
        )
        .unwrap();
        let ty = store.load_descriptor(&file).unwrap();
        assert!(ty.structurally_equal(&person()));
        assert!(store.type_by_name("Nobody").is_err());
    }
}
