//! Bucket behaviour against a real on-disk store

use lxp_core::{
    Error, Kind, ObjectRef, Oid, Record, Result, StructuralType, TransactionScope, TxnId,
};
use lxp_durability::DurabilityMode;
use lxp_storage::{BucketKind, Store, StoreConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Minimal transaction scope recording what a bucket registers
struct FakeTxn {
    id: TxnId,
    active: AtomicBool,
    /// Set to make the transaction close between the bucket's activity check
    /// and its registration, as a concurrent commit would
    closes_before_stage: AtomicBool,
    added: Mutex<Vec<ObjectRef>>,
    stage_calls: AtomicUsize,
}

impl FakeTxn {
    fn new(id: u64) -> Self {
        FakeTxn {
            id: TxnId::new(id),
            active: AtomicBool::new(true),
            closes_before_stage: AtomicBool::new(false),
            added: Mutex::new(Vec::new()),
            stage_calls: AtomicUsize::new(0),
        }
    }
}

impl TransactionScope for FakeTxn {
    fn txn_id(&self) -> TxnId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn add(&self, object: ObjectRef) -> bool {
        if !self.is_active() {
            return false;
        }
        let mut added = self.added.lock();
        if !added.contains(&object) {
            added.push(object);
        }
        true
    }

    fn stage(&self, object: ObjectRef, write: &mut dyn FnMut() -> Result<()>) -> Result<bool> {
        self.stage_calls.fetch_add(1, Ordering::SeqCst);
        if self.closes_before_stage.load(Ordering::SeqCst) {
            self.active.store(false, Ordering::SeqCst);
        }
        if !self.is_active() {
            return Ok(false);
        }
        write()?;
        Ok(self.add(object))
    }
}

fn open(dir: &TempDir) -> Store {
    Store::open_with_config(
        dir.path(),
        StoreConfig::default().with_durability(DurabilityMode::Os),
    )
    .unwrap()
}

fn person(name: &str, age: i32) -> Record {
    Record::new()
        .with("name", name)
        .unwrap()
        .with("age", age)
        .unwrap()
}

// ============================================================================
// Persistence and lookup
// ============================================================================

#[test]
fn test_make_persistent_assigns_distinct_oids() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();

    let mut a = person("Ada", 36);
    let mut b = person("Bob", 40);
    let oid_a = bucket.make_persistent(&mut a).unwrap();
    let oid_b = bucket.make_persistent(&mut b).unwrap();

    assert_ne!(oid_a, oid_b);
    assert_eq!(a.oid(), Some(oid_a));
    assert_eq!(bucket.oids().unwrap(), vec![oid_a, oid_b]);
    assert_eq!(bucket.len().unwrap(), 2);
}

#[test]
fn test_get_object_returns_same_instance() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();

    let first = bucket.get_object_by_id(oid).unwrap();
    let second = bucket.get_object_by_id(oid).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.read().get_string("name").unwrap(), "Ada");
}

#[test]
fn test_get_missing_object() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let err = bucket.get_object_by_id(Oid::new(999)).unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound { .. }));
    assert!(err.is_not_found());
}

#[test]
fn test_explicit_oid_collision_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let repo = store.create_repository("r").unwrap();
    let b1 = repo.create_bucket("one").unwrap();
    let b2 = repo.create_bucket("two").unwrap();

    let oid = b1.make_persistent(&mut person("Ada", 36)).unwrap();
    let mut clash = person("Eve", 1);
    clash.set_oid(oid);
    assert!(matches!(b2.make_persistent(&mut clash), Err(Error::Bucket(_))));

    let mut explicit = person("Zed", 2);
    explicit.set_oid(Oid::new(5000));
    b2.make_persistent(&mut explicit).unwrap();
    assert!(store.allocate_oid().unwrap() > Oid::new(5000));
}

#[test]
fn test_last_oid_is_rejected_without_writing() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let mut last = person("Omega", 1);
    last.set_oid(Oid::new(u64::MAX));
    assert!(matches!(bucket.make_persistent(&mut last), Err(Error::Bucket(_))));
    assert!(!bucket.contains(Oid::new(u64::MAX)));
    assert!(bucket.make_persistent(&mut person("Ada", 36)).is_ok());
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let oid = {
        let store = open(&dir);
        let bucket = store
            .create_repository("r")
            .unwrap()
            .create_bucket_with("b", BucketKind::Indexed, None)
            .unwrap();
        bucket.make_persistent(&mut person("Ada", 36)).unwrap()
    };

    let store = open(&dir);
    let bucket = store.bucket("r", "b").unwrap();
    assert_eq!(bucket.kind(), BucketKind::Indexed);
    assert!(bucket.contains(oid));
    assert_eq!(bucket.get_object_by_id(oid).unwrap().read().get_int("age").unwrap(), 36);
}

#[test]
fn test_delete_removes_record() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    bucket.get_object_by_id(oid).unwrap();

    bucket.delete(oid).unwrap();
    assert!(!bucket.contains(oid));
    assert!(bucket.cache().get(oid).is_none());
    assert!(matches!(bucket.delete(oid), Err(Error::ObjectNotFound { .. })));
}

// ============================================================================
// Content types
// ============================================================================

#[test]
fn test_content_type_is_enforced() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let ty = store
        .create_type(
            StructuralType::builder("Person")
                .field("name", Kind::String)
                .field("age", Kind::Int)
                .build(),
        )
        .unwrap();
    let bucket = store
        .create_repository("r")
        .unwrap()
        .create_bucket_with("people", BucketKind::Directory, ty.id())
        .unwrap();

    bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    let mut bad = Record::new().with("name", "NoAge").unwrap();
    assert!(matches!(bucket.make_persistent(&mut bad), Err(Error::TypeMismatch(_))));
}

#[test]
fn test_unregistered_content_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let repo = store.create_repository("r").unwrap();
    assert!(matches!(
        repo.create_bucket_with("b", BucketKind::Directory, Some(Oid::new(424242))),
        Err(Error::Bucket(_))
    ));
}

#[test]
fn test_corrupted_stored_record_fails_lookup() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let ty = store
        .create_type(StructuralType::builder("Named").field("name", Kind::String).build())
        .unwrap();
    let bucket = store
        .create_repository("r")
        .unwrap()
        .create_bucket_with("b", BucketKind::Directory, ty.id())
        .unwrap();
    let oid = bucket
        .make_persistent(&mut Record::new().with("name", "Ada").unwrap())
        .unwrap();

    // Rewrite the stored file behind the bucket's back.
    let path = store.paths().bucket("r", "b").record(oid);
    std::fs::write(&path, format!("{{\"$OID\": {}, \"name\": 7}}", oid)).unwrap();
    assert!(matches!(bucket.get_object_by_id(oid), Err(Error::Bucket(_))));
}

// ============================================================================
// Shadows
// ============================================================================

#[test]
fn test_update_stages_shadow_and_registers_once() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    let txn = FakeTxn::new(1);

    let mut changed = bucket.get_object_by_id(oid).unwrap().snapshot();
    changed.put("age", 37).unwrap();
    bucket.update(&txn, &changed).unwrap();
    changed.put("age", 38).unwrap();
    bucket.update(&txn, &changed).unwrap();

    assert!(bucket.has_shadow(oid));
    assert_eq!(txn.added.lock().len(), 1);
    assert_eq!(bucket.load_record(oid).unwrap().get_int("age").unwrap(), 36);
    assert_eq!(
        bucket.load_shadow(oid).unwrap().unwrap().get_int("age").unwrap(),
        38
    );
}

#[test]
fn test_update_requires_active_transaction() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    let txn = FakeTxn::new(1);
    txn.active.store(false, Ordering::SeqCst);

    let record = bucket.load_record(oid).unwrap();
    assert!(matches!(bucket.update(&txn, &record), Err(Error::Bucket(_))));
    assert!(!bucket.has_shadow(oid));
}

#[test]
fn test_update_of_absent_oid() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let txn = FakeTxn::new(1);
    let mut ghost = person("Ghost", 0);
    ghost.set_oid(Oid::new(77));
    assert!(matches!(
        bucket.update(&txn, &ghost),
        Err(Error::ObjectNotFound { .. })
    ));
}

#[test]
fn test_second_writer_conflicts() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    let record = bucket.load_record(oid).unwrap();

    let t1 = FakeTxn::new(1);
    let t2 = FakeTxn::new(2);
    bucket.update(&t1, &record).unwrap();
    match bucket.update(&t2, &record) {
        Err(Error::WriteConflict { holder, .. }) => assert_eq!(holder, TxnId::new(1)),
        other => panic!("expected write conflict, got {:?}", other),
    }

    bucket.cleanup(oid).unwrap();
    bucket.update(&t2, &record).unwrap();
    assert_eq!(bucket.shadow_holder(oid), Some(TxnId::new(2)));
}

#[test]
fn test_swizzle_refreshes_cached_instance_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    let held = bucket.get_object_by_id(oid).unwrap();

    let mut changed = held.snapshot();
    changed.put("age", 37).unwrap();
    bucket.update(&FakeTxn::new(1), &changed).unwrap();
    assert_eq!(held.read().get_int("age").unwrap(), 36);

    bucket.swizzle(oid).unwrap();
    bucket.swizzle(oid).unwrap();
    assert!(!bucket.has_shadow(oid));
    assert_eq!(held.read().get_int("age").unwrap(), 37);
    assert!(Arc::ptr_eq(&held, &bucket.get_object_by_id(oid).unwrap()));
    assert_eq!(bucket.shadow_holder(oid), Some(TxnId::new(1)));
}

#[test]
fn test_release_claim_only_frees_the_holder() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    let record = bucket.load_record(oid).unwrap();
    bucket.update(&FakeTxn::new(1), &record).unwrap();
    bucket.swizzle(oid).unwrap();

    let t2 = FakeTxn::new(2);
    assert!(matches!(
        bucket.update(&t2, &record),
        Err(Error::WriteConflict { .. })
    ));
    bucket.release_claim(oid, TxnId::new(2));
    assert_eq!(bucket.shadow_holder(oid), Some(TxnId::new(1)));

    bucket.release_claim(oid, TxnId::new(1));
    bucket.update(&t2, &record).unwrap();
    assert_eq!(bucket.shadow_holder(oid), Some(TxnId::new(2)));
}

#[test]
fn test_update_racing_close_leaves_no_claim_or_shadow() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    let record = bucket.load_record(oid).unwrap();

    let closing = FakeTxn::new(1);
    closing.closes_before_stage.store(true, Ordering::SeqCst);
    assert!(matches!(bucket.update(&closing, &record), Err(Error::Bucket(_))));
    assert_eq!(closing.stage_calls.load(Ordering::SeqCst), 1);
    assert!(closing.added.lock().is_empty());
    assert!(!bucket.has_shadow(oid));
    assert_eq!(bucket.shadow_holder(oid), None);

    let next = FakeTxn::new(2);
    bucket.update(&next, &record).unwrap();
    assert_eq!(bucket.shadow_holder(oid), Some(TxnId::new(2)));
}

#[test]
fn test_cleanup_discards_shadow() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();

    let mut changed = bucket.load_record(oid).unwrap();
    changed.put("age", 99).unwrap();
    bucket.update(&FakeTxn::new(1), &changed).unwrap();
    bucket.cleanup(oid).unwrap();
    bucket.cleanup(oid).unwrap();

    assert!(!bucket.has_shadow(oid));
    assert_eq!(bucket.get_object_by_id(oid).unwrap().read().get_int("age").unwrap(), 36);
}

#[test]
fn test_tidy_removes_shadows_and_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let bucket = store.create_repository("r").unwrap().create_bucket("b").unwrap();
    let oid = bucket.make_persistent(&mut person("Ada", 36)).unwrap();
    bucket
        .update(&FakeTxn::new(1), &bucket.load_record(oid).unwrap())
        .unwrap();
    let paths = store.paths().bucket("r", "b");
    std::fs::write(paths.dir().join("12345.tmp"), b"partial").unwrap();

    assert_eq!(bucket.tidy_up_transaction_data().unwrap(), 2);
    assert!(!bucket.has_shadow(oid));
    assert!(bucket.contains(oid));
    assert_eq!(bucket.shadow_holder(oid), None);
}

// ============================================================================
// Repositories
// ============================================================================

#[test]
fn test_bucket_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let repo = store.create_repository("r").unwrap();
    repo.create_bucket("b").unwrap();
    assert!(matches!(repo.create_bucket("b"), Err(Error::Bucket(_))));
    assert!(matches!(repo.create_bucket("x|y"), Err(Error::IllegalKey(_))));
    assert_eq!(repo.bucket_names(), vec!["b".to_string()]);

    repo.delete_bucket("b").unwrap();
    assert!(!repo.bucket_exists("b"));
    assert!(matches!(repo.get_bucket("b"), Err(Error::Bucket(_))));
}
