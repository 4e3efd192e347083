//! Core types and traits for the LXP store
//!
//! This crate defines the foundational types used throughout the system:
//! - Oid / TxnId / ObjectRef: identities and addresses
//! - Value: the value model of record fields
//! - Record: labelled cross-product with identity and an optional type label
//! - StructuralType / Kind: structural (duck) types and their checks
//! - json: the record ↔ JSON codec
//! - Error: error type hierarchy
//! - Traits: seams to the storage and concurrency layers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod json;
pub mod record;
pub mod schema;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{Error, ErrorKind, Result};
pub use record::{validate_label, Record, OID_LABEL, TYPE_LABEL};
pub use schema::{
    check_label_consistency, check_structural_consistency, Kind, StructuralType,
    StructuralTypeBuilder,
};
pub use traits::{NoSchema, SchemaContext, TransactionScope};
pub use types::{validate_name, ObjectRef, Oid, TxnId, TypeId};
pub use value::{Value, ValueKind};
