//! Core traits at the layer seams
//!
//! - [`SchemaContext`]: how structural checks resolve type ids and references
//!   without depending on the storage layer
//! - [`TransactionScope`]: what a bucket needs from the transaction that
//!   stages an update, without depending on the concurrency layer

use crate::error::Result;
use crate::record::Record;
use crate::schema::StructuralType;
use crate::types::{ObjectRef, TxnId, TypeId};
use std::sync::Arc;

/// Lookup services needed by structural type checking
///
/// Implemented by the store. Both lookups are infallible by signature:
/// a type or record that cannot be found simply makes the check fail.
pub trait SchemaContext {
    /// Resolve a structural type by id
    fn structural_type(&self, id: TypeId) -> Option<Arc<StructuralType>>;

    /// Load the current visible content of a referenced record
    fn resolve(&self, reference: &ObjectRef) -> Option<Record>;
}

/// A [`SchemaContext`] that knows no types and resolves no references
///
/// Sufficient for checking types that contain no reference fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSchema;

impl SchemaContext for NoSchema {
    fn structural_type(&self, _id: TypeId) -> Option<Arc<StructuralType>> {
        None
    }

    fn resolve(&self, _reference: &ObjectRef) -> Option<Record> {
        None
    }
}

/// The transaction a bucket update is staged under
///
/// Thread safety: a transaction handle may be shared across threads, so
/// implementations use interior mutability for `add` and `stage`.
pub trait TransactionScope: Send + Sync {
    /// Transaction id
    fn txn_id(&self) -> TxnId;

    /// True while the transaction can still accept updates
    fn is_active(&self) -> bool;

    /// Register a pending update of `object`
    ///
    /// Registering the same object twice keeps one entry. Returns `false`,
    /// registering nothing, once the transaction is no longer active.
    fn add(&self, object: ObjectRef) -> bool;

    /// Run `write`, then register `object`, while the transaction is held active
    ///
    /// The transaction cannot commit or roll back until this returns. Returns
    /// `Ok(false)` without running `write` if it is no longer active; an
    /// error from `write` leaves nothing registered.
    fn stage(&self, object: ObjectRef, write: &mut dyn FnMut() -> Result<()>) -> Result<bool>;
}
