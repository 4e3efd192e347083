//! Transaction manager: begin, commit, rollback and recovery
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Fail with TransactionFailed unless the transaction is active
//! 2. Mark it committed and unregister it (no further add can land)
//! 3. Write the commit record to the log bucket (DURABILITY POINT)
//! 4. Delete the start record
//! 5. Swizzle every (bucket, OID) in update order (VISIBILITY)
//! 6. Delete the commit record, then release the write claims
//! ```
//!
//! If step 3 fails the transaction is treated as rolled back: its shadows
//! are discarded and its start record deleted. Once step 3 has returned the
//! transaction can only be completed, never undone; any failure from step 4
//! on is logged and left to the next recovery pass, and commit still
//! returns `Ok`.
//!
//! Write claims outlive the swizzle. While the commit record exists a crash
//! replays it, and replay promotes whatever shadow is staged for each OID,
//! so no other transaction may stage one until the record is gone. If the
//! record cannot be deleted the claims stay until restart.
//!
//! ## Rollback Sequence
//!
//! Discard every shadow, then delete the start record. The start record is
//! the evidence recovery needs to sweep shadows, so it goes last.

use crate::log;
use crate::recovery::{RecoveryCoordinator, RecoveryStats};
use crate::testing::CrashPoint;
use crate::transaction::{Transaction, TransactionState};
use dashmap::DashMap;
use lxp_core::{Error, ObjectRef, Oid, Result, TxnId};
use lxp_storage::{Bucket, Store};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Coordinates transactions over one store
///
/// Opening the manager runs recovery; a store must have exactly one manager
/// and no transaction can begin before recovery has finished.
pub struct TransactionManager {
    store: Store,
    active: DashMap<TxnId, Arc<Transaction>>,
    last_recovery: RecoveryStats,
}

impl TransactionManager {
    /// Run recovery on `store` and return its manager
    pub fn open(store: Store) -> Result<Self> {
        let last_recovery = RecoveryCoordinator::new(&store).recover()?;
        Ok(TransactionManager {
            store,
            active: DashMap::new(),
            last_recovery,
        })
    }

    /// The managed store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Statistics of the recovery pass run at open
    pub fn last_recovery(&self) -> &RecoveryStats {
        &self.last_recovery
    }

    /// Number of active transactions
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Check whether `txn_id` names an active transaction
    pub fn is_active(&self, txn_id: TxnId) -> bool {
        self.active.contains_key(&txn_id)
    }

    /// Start a transaction
    ///
    /// Writes the start record before returning.
    ///
    /// # Errors
    /// `TransactionFailed` if the start record cannot be written.
    pub fn begin(&self) -> Result<Arc<Transaction>> {
        let id = TxnId::new(self.store.allocate_oid()?.as_u64());
        let start_oid = log::start_record(id)
            .and_then(|mut start| self.store.transaction_log()?.make_persistent(&mut start))
            .map_err(|e| {
                Error::TransactionFailed(format!("could not write start record of {}: {}", id, e))
            })?;

        let txn = Arc::new(Transaction::new(id, start_oid));
        self.active.insert(id, Arc::clone(&txn));
        debug!(target: "lxp::txn", txn_id = %id, start_record = %start_oid, "Transaction started");
        Ok(txn)
    }

    /// Commit a transaction
    ///
    /// Returns once every update is visible, or once the commit is durable
    /// and a later step has failed (recovery will finish it).
    ///
    /// # Errors
    /// `TransactionFailed` if the transaction is not active or the commit
    /// record cannot be written.
    pub fn commit(&self, txn: &Transaction) -> Result<()> {
        self.run_commit(txn, None)
    }

    /// Run the commit protocol up to `point`, then stop as a crash would
    ///
    /// For crash-recovery tests. The in-memory state left behind is not
    /// meaningful; drop the store and reopen it.
    pub fn commit_until_crash(&self, txn: &Transaction, point: CrashPoint) -> Result<()> {
        self.run_commit(txn, Some(point))
    }

    fn run_commit(&self, txn: &Transaction, crash: Option<CrashPoint>) -> Result<()> {
        let id = txn.id();
        let updates = txn.close(TransactionState::Committed).ok_or_else(|| {
            Error::TransactionFailed(format!("{} is not active ({})", id, txn.state()))
        })?;
        self.active.remove(&id);
        let log_bucket = self.store.transaction_log()?;

        if crash == Some(CrashPoint::BeforeCommitRecord) {
            return Ok(());
        }

        let written = log::commit_record(id, &updates)
            .and_then(|mut commit| log_bucket.make_persistent(&mut commit));
        let commit_oid = match written {
            Ok(oid) => oid,
            Err(e) => {
                txn.mark_failed();
                self.discard_updates(id, &updates);
                self.delete_log_record(&log_bucket, txn.start_record(), id);
                return Err(Error::TransactionFailed(format!(
                    "could not write commit record of {}: {}",
                    id, e
                )));
            }
        };
        // DURABILITY POINT
        debug!(target: "lxp::txn", txn_id = %id, commit_record = %commit_oid, updates = updates.len(), "Commit record durable");
        if crash == Some(CrashPoint::AfterCommitRecord) {
            return Ok(());
        }

        self.delete_log_record(&log_bucket, txn.start_record(), id);
        if crash == Some(CrashPoint::AfterStartRecordDeleted) {
            return Ok(());
        }

        let mut complete = true;
        for (i, update) in updates.iter().enumerate() {
            if let Err(e) = self.swizzle(update) {
                complete = false;
                error!(target: "lxp::txn", txn_id = %id, object = %update, error = %e, "Swizzle failed after commit; recovery will complete it");
            }
            if i == 0 && crash == Some(CrashPoint::AfterFirstSwizzle) {
                return Ok(());
            }
        }
        if crash.is_some() {
            return Ok(());
        }

        if complete && self.delete_log_record(&log_bucket, commit_oid, id) {
            self.release_claims(id, &updates);
        }
        debug!(target: "lxp::txn", txn_id = %id, "Transaction committed");
        Ok(())
    }

    /// Roll back a transaction, discarding every staged update
    ///
    /// # Errors
    /// `IllegalState` if the transaction is not active.
    pub fn rollback(&self, txn: &Transaction) -> Result<()> {
        let id = txn.id();
        let updates = txn.close(TransactionState::RolledBack).ok_or_else(|| {
            Error::IllegalState(format!("cannot roll back {}: it is {}", id, txn.state()))
        })?;
        self.active.remove(&id);

        self.discard_updates(id, &updates);
        let log_bucket = self.store.transaction_log()?;
        self.delete_log_record(&log_bucket, txn.start_record(), id);
        debug!(target: "lxp::txn", txn_id = %id, "Transaction rolled back");
        Ok(())
    }

    /// Run `f` in a fresh transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back if it returns `Err`.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let txn = self.begin()?;
        match f(&txn) {
            Ok(value) => {
                self.commit(&txn)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback(&txn) {
                    warn!(target: "lxp::txn", txn_id = %txn.id(), error = %rollback_err, "Rollback after failed closure did not complete");
                }
                Err(e)
            }
        }
    }

    fn swizzle(&self, update: &ObjectRef) -> Result<()> {
        self.store
            .bucket(&update.repository, &update.bucket)?
            .swizzle(update.oid)
    }

    fn discard_updates(&self, id: TxnId, updates: &[ObjectRef]) {
        for update in updates {
            let result = self
                .store
                .bucket(&update.repository, &update.bucket)
                .and_then(|bucket| bucket.cleanup(update.oid));
            if let Err(e) = result {
                warn!(target: "lxp::txn", txn_id = %id, object = %update, error = %e, "Failed to discard shadow");
            }
        }
    }

    fn release_claims(&self, id: TxnId, updates: &[ObjectRef]) {
        for update in updates {
            if let Ok(bucket) = self.store.bucket(&update.repository, &update.bucket) {
                bucket.release_claim(update.oid, id);
            }
        }
    }

    fn delete_log_record(&self, log_bucket: &Bucket, oid: Oid, id: TxnId) -> bool {
        match log_bucket.delete(oid) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "lxp::txn", txn_id = %id, oid = %oid, error = %e, "Failed to delete log record; recovery will remove it");
                false
            }
        }
    }
}
