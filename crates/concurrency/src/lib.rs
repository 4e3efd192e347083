//! Concurrency layer for the LXP store
//!
//! This crate implements the commit/recovery protocol on top of buckets:
//! - Transaction: explicit handle tracking staged (bucket, OID) updates
//! - TransactionManager: begin, commit (redo-only past the durability
//!   point), rollback
//! - log: start and commit record format in the reserved log bucket
//! - RecoveryCoordinator: roll-forward of durable commits at startup
//! - testing: crash points for exercising recovery

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod log;
pub mod manager;
pub mod recovery;
pub mod testing;
pub mod transaction;

pub use manager::TransactionManager;
pub use recovery::{RecoveryCoordinator, RecoveryStats};
pub use transaction::{Transaction, TransactionState};
