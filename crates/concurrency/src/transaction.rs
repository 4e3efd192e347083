//! Transactions
//!
//! A [`Transaction`] is a handle passed explicitly to every mutation made
//! under it. It tracks the (bucket, OID) pairs whose shadows it has staged;
//! the [`TransactionManager`](crate::TransactionManager) turns that list
//! into a commit record at commit time.
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──commit──▶ Committed
//!    │
//!    └────rollback──▶ RolledBack
//! ```
//!
//! Both end states are terminal.

use lxp_core::{ObjectRef, Oid, Result, TransactionScope, TxnId};
use parking_lot::Mutex;
use std::fmt;

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting updates
    Active,
    /// Durably committed
    Committed,
    /// Rolled back, or failed before its commit record was written
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => f.write_str("active"),
            TransactionState::Committed => f.write_str("committed"),
            TransactionState::RolledBack => f.write_str("rolled back"),
        }
    }
}

struct TxnInner {
    state: TransactionState,
    /// Pending updates, in registration order
    updates: Vec<ObjectRef>,
}

/// Handle to one transaction
pub struct Transaction {
    id: TxnId,
    start_record: Oid,
    inner: Mutex<TxnInner>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("updates", &inner.updates.len())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(id: TxnId, start_record: Oid) -> Self {
        Transaction {
            id,
            start_record,
            inner: Mutex::new(TxnInner {
                state: TransactionState::Active,
                updates: Vec::new(),
            }),
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// OID of this transaction's start record in the log bucket
    pub fn start_record(&self) -> Oid {
        self.start_record
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    /// Pending updates registered so far
    pub fn updates(&self) -> Vec<ObjectRef> {
        self.inner.lock().updates.clone()
    }

    /// Move from `Active` to `to`, handing back the update list
    ///
    /// Returns `None` if the transaction was not active. State and list are
    /// taken under one lock, so no `add` can land after the transition.
    pub(crate) fn close(&self, to: TransactionState) -> Option<Vec<ObjectRef>> {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return None;
        }
        inner.state = to;
        Some(std::mem::take(&mut inner.updates))
    }

    /// Record that a commit attempt failed before its durability point
    pub(crate) fn mark_failed(&self) {
        self.inner.lock().state = TransactionState::RolledBack;
    }
}

impl TransactionScope for Transaction {
    fn txn_id(&self) -> TxnId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.inner.lock().state == TransactionState::Active
    }

    fn add(&self, object: ObjectRef) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return false;
        }
        if !inner.updates.contains(&object) {
            inner.updates.push(object);
        }
        true
    }

    fn stage(&self, object: ObjectRef, write: &mut dyn FnMut() -> Result<()>) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return Ok(false);
        }
        write()?;
        if !inner.updates.contains(&object) {
            inner.updates.push(object);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(oid: u64) -> ObjectRef {
        ObjectRef::new("r", "b", Oid::new(oid))
    }

    #[test]
    fn test_add_while_active() {
        let txn = Transaction::new(TxnId::new(1), Oid::new(10));
        assert!(txn.add(obj(1)));
        assert!(txn.add(obj(2)));
        assert!(txn.add(obj(1)));
        assert_eq!(txn.updates(), vec![obj(1), obj(2)]);
        assert!(txn.is_active());
    }

    #[test]
    fn test_close_is_terminal() {
        let txn = Transaction::new(TxnId::new(1), Oid::new(10));
        txn.add(obj(1));
        assert_eq!(txn.close(TransactionState::Committed), Some(vec![obj(1)]));
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(txn.close(TransactionState::RolledBack), None);
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    #[test]
    fn test_late_add_is_ignored() {
        let txn = Transaction::new(TxnId::new(1), Oid::new(10));
        txn.close(TransactionState::RolledBack);
        assert!(!txn.add(obj(3)));
        assert!(txn.updates().is_empty());
        assert!(!txn.is_active());
    }

    #[test]
    fn test_stage_after_close_runs_nothing() {
        let txn = Transaction::new(TxnId::new(1), Oid::new(10));
        txn.close(TransactionState::Committed);
        let mut ran = false;
        let staged = txn
            .stage(obj(4), &mut || {
                ran = true;
                Ok(())
            })
            .unwrap();
        assert!(!staged);
        assert!(!ran);
        assert!(txn.updates().is_empty());
    }

    #[test]
    fn test_stage_registers_only_on_successful_write() {
        let txn = Transaction::new(TxnId::new(1), Oid::new(10));
        let failed = txn.stage(obj(5), &mut || {
            Err(lxp_core::Error::Bucket("disk full".to_string()))
        });
        assert!(failed.is_err());
        assert!(txn.updates().is_empty());

        assert!(txn.stage(obj(5), &mut || Ok(())).unwrap());
        assert!(txn.stage(obj(5), &mut || Ok(())).unwrap());
        assert_eq!(txn.updates(), vec![obj(5)]);
    }
}
