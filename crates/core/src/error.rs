//! Error types for the LXP store
//!
//! This module defines the single error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Every fallible operation returns [`Result`]. Expected outcomes such as
//! "no record with this OID" are error variants, never panics.

use crate::types::{Oid, TxnId};
use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the LXP store
#[derive(Debug, Error)]
pub enum Error {
    /// Label absent from a record
    #[error("Label not found: {0}")]
    LabelNotFound(String),

    /// OID absent from a bucket
    #[error("Object {oid} not found in bucket {bucket}")]
    ObjectNotFound {
        /// Qualified bucket name (`repo/bucket`)
        bucket: String,
        /// Missing OID
        oid: Oid,
    },

    /// Value of the wrong kind, or a record failing structural validation
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Reserved or malformed label or name
    #[error("Illegal key: {0}")]
    IllegalKey(String),

    /// Failure in the bucket/storage layer (missing bucket, OID collision, ...)
    #[error("Bucket error: {0}")]
    Bucket(String),

    /// Transaction could not begin or commit
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Protocol misuse, e.g. rolling back an inactive transaction
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Another active transaction already holds the shadow for this OID
    #[error("Write conflict on {object}: shadow held by {holder}")]
    WriteConflict {
        /// Qualified object address (`repo/bucket/oid`)
        object: String,
        /// Transaction that holds the shadow
        holder: TxnId,
    },

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Durable state that cannot be interpreted
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`Error`]
///
/// Lets an outer layer (e.g. an HTTP façade) branch on the kind of failure
/// without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// OID or label absent
    NotFound,
    /// Kind mismatch or failed structural validation
    TypeMismatch,
    /// Reserved or malformed label/name
    IllegalKey,
    /// Storage layer failure
    BucketError,
    /// Begin/commit failure or write conflict
    TransactionFailed,
    /// Protocol misuse
    IllegalState,
    /// Underlying I/O
    Io,
    /// Unreadable durable state or bad configuration
    Corruption,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LabelNotFound(_) | Error::ObjectNotFound { .. } => ErrorKind::NotFound,
            Error::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Error::IllegalKey(_) => ErrorKind::IllegalKey,
            Error::Bucket(_) => ErrorKind::BucketError,
            Error::TransactionFailed(_) | Error::WriteConflict { .. } => {
                ErrorKind::TransactionFailed
            }
            Error::IllegalState(_) => ErrorKind::IllegalState,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) | Error::Corruption(_) | Error::Config(_) => {
                ErrorKind::Corruption
            }
        }
    }

    /// True for a missing OID or label
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_object_not_found() {
        let err = Error::ObjectNotFound {
            bucket: "people/adults".to_string(),
            oid: Oid::new(12),
        };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("people/adults"));
    }

    #[test]
    fn test_error_display_write_conflict() {
        let err = Error::WriteConflict {
            object: "r/b/3".to_string(),
            holder: TxnId::new(4),
        };
        assert!(err.to_string().contains("txn-4"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_from_serde_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = result.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_kinds() {
        assert!(Error::LabelNotFound("x".into()).is_not_found());
        assert_eq!(
            Error::TypeMismatch("x".into()).kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(Error::IllegalKey("x".into()).kind(), ErrorKind::IllegalKey);
        assert_eq!(Error::Bucket("x".into()).kind(), ErrorKind::BucketError);
        assert_eq!(
            Error::TransactionFailed("x".into()).kind(),
            ErrorKind::TransactionFailed
        );
        assert_eq!(
            Error::IllegalState("x".into()).kind(),
            ErrorKind::IllegalState
        );
        assert_eq!(Error::Corruption("x".into()).kind(), ErrorKind::Corruption);
    }
}
