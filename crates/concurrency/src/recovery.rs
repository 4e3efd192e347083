//! Startup recovery for the commit protocol
//!
//! Runs once, single-threaded, before any transaction can begin.
//!
//! ## Recovery Procedure
//!
//! 1. If the log bucket is empty, stop: nothing was in flight
//! 2. For every record in the log bucket:
//!    - commit record: swizzle every listed update (roll forward), then
//!      delete the record
//!    - start-only or malformed record: delete it; its transaction never
//!      reached the commit point and is implicitly aborted
//! 3. Tidy every bucket, removing orphaned shadows and interrupted writes
//! 4. Invalidate every object cache
//!
//! A log file that cannot be read as a record at all is corruption and
//! fails the open. A swizzle failure also fails the open: the commit is
//! durable, and tidying would otherwise destroy the shadow it still needs.
//! Failures to delete log records or to tidy a bucket are logged and
//! counted; the next recovery pass redoes them idempotently.

use crate::log::{self, LogRecord};
use lxp_core::Result;
use lxp_storage::Store;
use tracing::{debug, info, warn};

/// Outcome of one recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Commit records rolled forward
    pub commits_replayed: usize,
    /// Individual (bucket, OID) swizzles performed
    pub objects_swizzled: usize,
    /// Start-only or malformed log records deleted
    pub records_discarded: usize,
    /// Buckets swept successfully
    pub buckets_tidied: usize,
    /// Shadow and temp files removed by the sweep
    pub shadows_removed: usize,
    /// Buckets whose sweep failed
    pub tidy_failures: usize,
}

impl RecoveryStats {
    /// True if the pass found nothing to do
    pub fn is_clean(&self) -> bool {
        self.commits_replayed == 0 && self.records_discarded == 0 && self.shadows_removed == 0
    }
}

/// Coordinates the recovery pass over one store
pub struct RecoveryCoordinator<'a> {
    store: &'a Store,
}

impl<'a> RecoveryCoordinator<'a> {
    /// Create a coordinator for `store`
    pub fn new(store: &'a Store) -> Self {
        RecoveryCoordinator { store }
    }

    /// Run the recovery pass
    ///
    /// # Errors
    /// - `Corruption` if a log record cannot be parsed
    /// - any error from swizzling a durable commit
    pub fn recover(&self) -> Result<RecoveryStats> {
        let mut stats = RecoveryStats::default();
        let log_bucket = self.store.transaction_log()?;
        let entries = log_bucket.oids()?;
        if entries.is_empty() {
            debug!(target: "lxp::recovery", "Transaction log empty, no recovery needed");
            return Ok(stats);
        }

        for oid in entries {
            let record = log_bucket.load_record(oid)?;
            match log::classify(&record) {
                LogRecord::Commit { txn_id, updates } => {
                    for update in &updates {
                        match self.store.bucket(&update.repository, &update.bucket) {
                            Ok(bucket) => {
                                bucket.swizzle(update.oid)?;
                                stats.objects_swizzled += 1;
                            }
                            Err(e) => {
                                warn!(target: "lxp::recovery", object = %update, error = %e, "Skipping update of missing bucket");
                            }
                        }
                    }
                    stats.commits_replayed += 1;
                    debug!(target: "lxp::recovery", txn_id = ?txn_id, updates = updates.len(), "Commit rolled forward");
                }
                LogRecord::Start(txn_id) => {
                    stats.records_discarded += 1;
                    debug!(target: "lxp::recovery", txn_id = ?txn_id, "Discarding uncommitted transaction");
                }
                LogRecord::Malformed => {
                    stats.records_discarded += 1;
                    warn!(target: "lxp::recovery", oid = %oid, "Discarding malformed log record");
                }
            }
            if let Err(e) = log_bucket.delete(oid) {
                warn!(target: "lxp::recovery", oid = %oid, error = %e, "Failed to delete log record");
            }
        }

        for bucket in self.store.all_buckets() {
            match bucket.tidy_up_transaction_data() {
                Ok(removed) => {
                    stats.buckets_tidied += 1;
                    stats.shadows_removed += removed;
                }
                Err(e) => {
                    stats.tidy_failures += 1;
                    warn!(target: "lxp::recovery", bucket = %bucket.qualified_name(), error = %e, "Failed to tidy bucket");
                }
            }
        }

        for bucket in self.store.all_buckets() {
            bucket.invalidate_cache();
        }

        info!(
            target: "lxp::recovery",
            commits_replayed = stats.commits_replayed,
            objects_swizzled = stats.objects_swizzled,
            records_discarded = stats.records_discarded,
            buckets_tidied = stats.buckets_tidied,
            shadows_removed = stats.shadows_removed,
            tidy_failures = stats.tidy_failures,
            "Recovery complete"
        );
        Ok(stats)
    }
}
