//! Crash injection for commit-protocol tests
//!
//! [`TransactionManager::commit_until_crash`](crate::TransactionManager::commit_until_crash)
//! runs the commit protocol up to a [`CrashPoint`] and stops there, leaving
//! durable state exactly as a process crash at that step would. A test then
//! drops the store, reopens it, and checks what recovery made of it.
//!
//! ```text
//! begin ─ start record written
//! commit
//!   ├─ BeforeCommitRecord      nothing durable beyond shadows + start record
//!   ├─ commit record written   ◀── durability point
//!   ├─ AfterCommitRecord
//!   ├─ start record deleted
//!   ├─ AfterStartRecordDeleted
//!   ├─ first swizzle
//!   ├─ AfterFirstSwizzle
//!   ├─ remaining swizzles
//!   ├─ AfterSwizzle
//!   └─ commit record deleted
//! ```

use std::fmt;

/// Step of the commit protocol after which a simulated crash stops it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// Shadows staged; the commit record was never written
    BeforeCommitRecord,
    /// Commit record durable; nothing else done
    AfterCommitRecord,
    /// Start record deleted; no swizzle yet
    AfterStartRecordDeleted,
    /// Only the first update swizzled
    AfterFirstSwizzle,
    /// Every update swizzled; commit record still present
    AfterSwizzle,
}

impl CrashPoint {
    /// All crash points, in protocol order
    pub const ALL: [CrashPoint; 5] = [
        CrashPoint::BeforeCommitRecord,
        CrashPoint::AfterCommitRecord,
        CrashPoint::AfterStartRecordDeleted,
        CrashPoint::AfterFirstSwizzle,
        CrashPoint::AfterSwizzle,
    ];

    /// True if the commit record is durable at this point
    pub fn is_durable(&self) -> bool {
        !matches!(self, CrashPoint::BeforeCommitRecord)
    }
}

impl fmt::Display for CrashPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrashPoint::BeforeCommitRecord => "before-commit-record",
            CrashPoint::AfterCommitRecord => "after-commit-record",
            CrashPoint::AfterStartRecordDeleted => "after-start-record-deleted",
            CrashPoint::AfterFirstSwizzle => "after-first-swizzle",
            CrashPoint::AfterSwizzle => "after-swizzle",
        };
        f.write_str(name)
    }
}
