//! Store-wide OID allocator
//!
//! OIDs grow monotonically and are never reused, even across crashes. The
//! allocator reserves OIDs in blocks: before the first OID of a block is
//! handed out, the block's upper bound is written durably to `OIDS`. On
//! restart allocation resumes at that bound, so a crash can leave gaps but
//! never duplicates.

use lxp_core::{Error, Oid, Result};
use lxp_durability::{write_atomic, DurabilityMode};
use parking_lot::Mutex;
use std::path::PathBuf;

/// Number of OIDs reserved per durable write
pub const DEFAULT_BLOCK_SIZE: u64 = 1024;

/// First OID ever handed out by a fresh store
pub const FIRST_OID: u64 = 1;

#[derive(Debug)]
struct AllocState {
    /// Next OID to hand out
    next: u64,
    /// Exclusive upper bound of the durably reserved block
    reserved_until: u64,
}

/// Durable, monotonic OID source
#[derive(Debug)]
pub struct OidAllocator {
    path: PathBuf,
    durability: DurabilityMode,
    block_size: u64,
    state: Mutex<AllocState>,
}

impl OidAllocator {
    /// Open the allocator persisted at `path` (fresh if absent)
    pub fn open(path: PathBuf, durability: DurabilityMode) -> Result<Self> {
        Self::with_block_size(path, durability, DEFAULT_BLOCK_SIZE)
    }

    /// Open with a custom block size
    pub fn with_block_size(
        path: PathBuf,
        durability: DurabilityMode,
        block_size: u64,
    ) -> Result<Self> {
        let start = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            text.trim().parse::<u64>().map_err(|_| {
                Error::Corruption(format!(
                    "OID high-water mark '{}' in {} is not a number",
                    text.trim(),
                    path.display()
                ))
            })?
        } else {
            FIRST_OID
        };

        Ok(OidAllocator {
            path,
            durability,
            block_size: block_size.max(1),
            state: Mutex::new(AllocState {
                next: start,
                reserved_until: start,
            }),
        })
    }

    /// Hand out the next OID
    ///
    /// # Errors
    /// `Bucket` once the OID space is exhausted.
    pub fn allocate(&self) -> Result<Oid> {
        let mut state = self.state.lock();
        if state.next >= state.reserved_until {
            let bound = state
                .next
                .checked_add(self.block_size)
                .ok_or_else(exhausted)?;
            self.persist(bound)?;
            state.reserved_until = bound;
        }
        let oid = state.next;
        state.next += 1;
        Ok(Oid::new(oid))
    }

    /// Record that `oid` was assigned by a caller, so it is never handed out
    ///
    /// # Errors
    /// `Bucket` if `oid` is the last OID, leaving nothing to hand out after it.
    pub fn observe(&self, oid: Oid) -> Result<()> {
        let mut state = self.state.lock();
        let after = oid.as_u64().checked_add(1).ok_or_else(exhausted)?;
        if after > state.next {
            state.next = after;
            if after > state.reserved_until {
                self.persist(after)?;
                state.reserved_until = after;
            }
        }
        Ok(())
    }

    /// The OID the next `allocate` will return
    pub fn peek_next(&self) -> Oid {
        Oid::new(self.state.lock().next)
    }

    fn persist(&self, bound: u64) -> Result<()> {
        write_atomic(&self.path, bound.to_string().as_bytes(), self.durability)?;
        Ok(())
    }
}

fn exhausted() -> Error {
    Error::Bucket("OID space exhausted".to_string())
}
