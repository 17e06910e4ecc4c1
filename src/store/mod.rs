//! Object store traits and types for the remote side of a sync.
//!
//! The sync engine only needs three capabilities from the storage provider:
//! checking the bucket, listing keys page by page, and uploading a file.
//! [`ObjectStore`] captures exactly those, with an S3 implementation for real
//! use and an in-memory one for tests.

mod memory_object_store;
mod s3_object_store;

pub use memory_object_store::{MemoryObjectStore, MemoryObjectStoreBuilder, StoredObject};
pub use s3_object_store::{S3ObjectStore, S3ObjectStoreConfig};

use async_trait::async_trait;
use std::path::Path;

use crate::config::AccessPolicy;

/// Result type for object store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in object store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    /// ETag with surrounding quotes removed.
    pub etag: Option<String>,
}

/// Per-upload options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub access: AccessPolicy,
    /// Store with the REDUCED_REDUNDANCY storage class.
    pub reduced_redundancy: bool,
}

/// The storage provider as seen by the sync engine.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store writes to.
    fn bucket(&self) -> &str;

    /// Whether the bucket exists.
    ///
    /// Credential and connectivity failures are errors, not `false`.
    async fn bucket_exists(&self) -> Result<bool>;

    /// List up to `max_keys` objects in key order, starting strictly after
    /// `marker` when one is given. An empty page means the listing is done.
    async fn list_objects(&self, marker: Option<&str>, max_keys: u32)
    -> Result<Vec<ObjectSummary>>;

    /// Upload the full contents of `source` under `key`.
    async fn put_object(&self, key: &str, source: &Path, options: PutOptions) -> Result<()>;
}

/// Strip the quotes S3 wraps around ETags.
pub(crate) fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}
