//! Storage layer for the LXP store
//!
//! This crate implements the persistent object graph:
//! - Store: directory layout, process lock, OID allocator, repositories
//! - Repository: named container of buckets
//! - Bucket: OID-indexed records with shadow staging for transactions
//! - ObjectCache: per-bucket identity map of loaded records
//! - TypeRegistry: published structural types
//! - StoreConfig: `lxp.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod bucket;
pub mod cache;
pub mod config;
pub mod registry;
pub mod repository;
pub mod store;

pub use allocator::OidAllocator;
pub use bucket::{Bucket, BucketKind};
pub use cache::{CachedRecord, ObjectCache};
pub use config::StoreConfig;
pub use registry::TypeRegistry;
pub use repository::Repository;
pub use store::{
    Store, StoreInner, TRANSACTION_BUCKET, TRANSACTION_REPOSITORY, TYPE_BUCKET, TYPE_REPOSITORY,
};
