//! Core identity types for the LXP store
//!
//! This module defines the foundational identifiers:
//! - Oid: Store-wide unique identifier of a record
//! - TxnId: Identifier of an in-flight transaction
//! - ObjectRef: Fully qualified (repository, bucket, oid) address of a record
//!
//! It also owns the naming rules shared by repositories and buckets.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-wide unique identifier of a record
///
/// OIDs are allocated by the store, grow monotonically, and are never reused,
/// even across restarts. Structural type ids are OIDs too: a type is a record
/// in the reserved type repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(u64);

impl Oid {
    /// Wrap a raw OID value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Oid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(Oid)
            .map_err(|_| Error::IllegalKey(format!("'{}' is not a valid OID", s)))
    }
}

/// Identifier of a structural type (the OID of its descriptor record)
pub type TypeId = Oid;

/// Identifier of a transaction
///
/// Unique among active transactions. Written into the start record of the
/// transaction log so that an interrupted transaction can be identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw transaction id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Fully qualified address of a record: repository, bucket and OID
///
/// This is both the value of a reference field and the unit a transaction
/// records in its update list.
///
/// Display format: `repo/bucket/oid`, the same handle string the REST
/// layer hands back after creating a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Repository name
    pub repository: String,
    /// Bucket name within the repository
    pub bucket: String,
    /// Record identifier
    pub oid: Oid,
}

impl ObjectRef {
    /// Create a new object reference
    pub fn new(repository: impl Into<String>, bucket: impl Into<String>, oid: Oid) -> Self {
        Self {
            repository: repository.into(),
            bucket: bucket.into(),
            oid,
        }
    }

    /// Parse a `repo/bucket/oid` handle string
    pub fn parse_handle(handle: &str) -> Result<Self> {
        let mut parts = handle.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(repo), Some(bucket), Some(oid), None) => {
                validate_name(repo)?;
                validate_name(bucket)?;
                Ok(Self::new(repo, bucket, oid.parse()?))
            }
            _ => Err(Error::IllegalKey(format!(
                "'{}' is not a repo/bucket/oid handle",
                handle
            ))),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.repository, self.bucket, self.oid)
    }
}

/// Characters that may never appear in a repository or bucket name
///
/// `/` separates handle segments, `|` separates commit log fields and
/// newlines separate commit log lines.
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '|', '\n', '\r', '\0'];

/// Validate a repository or bucket name
///
/// Names must be non-empty, must not start with `.` (reserved for on-disk
/// metadata), and must not contain path or log separators.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::IllegalKey("name must not be empty".to_string()));
    }
    if name.starts_with('.') {
        return Err(Error::IllegalKey(format!(
            "name '{}' must not start with '.'",
            name
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(Error::IllegalKey(format!(
            "name '{}' contains forbidden character {:?}",
            name, c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_ordering_and_display() {
        let a = Oid::new(3);
        let b = Oid::from(10);
        assert!(a < b);
        assert_eq!(b.to_string(), "10");
        assert_eq!("42".parse::<Oid>().unwrap(), Oid::new(42));
    }

    #[test]
    fn test_oid_parse_rejects_garbage() {
        assert!(matches!("x1".parse::<Oid>(), Err(Error::IllegalKey(_))));
        assert!("-1".parse::<Oid>().is_err());
    }

    #[test]
    fn test_object_ref_handle_roundtrip() {
        let r = ObjectRef::new("people", "adults", Oid::new(7));
        assert_eq!(r.to_string(), "people/adults/7");
        assert_eq!(ObjectRef::parse_handle("people/adults/7").unwrap(), r);
    }

    #[test]
    fn test_object_ref_rejects_bad_handles() {
        assert!(ObjectRef::parse_handle("people/adults").is_err());
        assert!(ObjectRef::parse_handle("a/b/c/d").is_err());
        assert!(ObjectRef::parse_handle("a/b/notanumber").is_err());
        assert!(ObjectRef::parse_handle("/b/1").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("people").is_ok());
        assert!(validate_name("_types").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a|b").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\nb").is_err());
    }

    #[test]
    fn test_txn_id_display() {
        assert_eq!(TxnId::new(9).to_string(), "txn-9");
    }
}
