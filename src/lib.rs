//! ssync-rs - Incrementally mirror local directory trees into S3 buckets.

pub mod cli;
pub mod config;
pub mod encrypt;
pub mod local;
pub mod store;
pub mod sync;

pub use store::{
    Error, MemoryObjectStore, MemoryObjectStoreBuilder, ObjectStore, ObjectSummary, PutOptions,
    Result, S3ObjectStore, S3ObjectStoreConfig,
};
pub use sync::{RunOptions, SyncEngine, SyncError, SyncReport, run_sync};
