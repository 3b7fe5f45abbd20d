//! # Strata Store - Persistence
//!
//! **Purpose**: Durable state of the metainfo service.
//!
//! - **Key-value engine**: [`KeyValueStore`] abstracts the ordered byte store
//!   underneath everything, with an in-memory handler for tests and
//!   single-process deployments.
//! - **Pointer store**: one [`strata_core::Pointer`] per encoded segment path,
//!   with compare-and-swap writes for commits that race and unconditional
//!   writes for paths that were already authorised and validated.
//! - **Bucket store**: bucket records and their partner attribution.
//!
//! Per-key operations are atomic. Nothing here spans more than one key.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Store error type
pub mod error;

/// Ordered key-value engine abstraction
pub mod kv;

/// In-memory key-value handler
pub mod memory;

/// Segment pointer service
pub mod pointers;

/// Bucket records
pub mod buckets;

pub use buckets::{
    AllowedBuckets, Bucket, BucketList, BucketListOptions, BucketStore, CipherSuite,
    EncryptionParameters, ListDirection, MemoryBucketStore,
};
pub use error::StoreError;
pub use kv::{list_v2, IterateOptions, KeyValueStore, ListItem, ListOptions, LIST_LIMIT};
pub use memory::MemoryKeyValueStore;
pub use pointers::{ListedPointer, PointerStore};
