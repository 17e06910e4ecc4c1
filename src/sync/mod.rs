//! Sync module for mirroring a local tree into a bucket.
//!
//! # Overview
//!
//! A run pushes every local file that is not verifiably present remotely.
//! After a clean run the next one only looks at modification times; without
//! a record of a clean run it compares checksums of the local tree with the
//! ETags of the bucket listing. Remote objects are never deleted.
//!
//! # Key Types
//!
//! - [`SyncEngine`] - Runs syncs for one target
//! - [`LockManager`] - Keeps runs for the same target from overlapping
//! - [`SyncStateTracker`] - Records started and completed runs
//! - [`TransferPipeline`] - Encrypts and uploads the transfer queue
//! - [`StagingRegistry`] - Removes encrypted staging copies after a delay

mod diff;
mod error;
mod key_map;
mod local_manifest;
mod lock;
mod manifest;
mod naming;
mod remote_manifest;
mod run_sync;
mod staging;
mod state;
mod transfer;

pub use diff::{DiffStrategy, checksum_diff, localize_remote, modified_since};
pub use error::{Result, SyncError};
pub use key_map::KeyMapper;
pub use local_manifest::{ChecksumWalker, FsChecksumWalker, LocalManifestBuilder, digest_file};
pub use lock::{LockManager, ScopedLock};
pub use manifest::{FileRecord, format_line, parse_line, parse_manifest, write_manifest};
pub use remote_manifest::{DEFAULT_PAGE_SIZE, fetch_remote_manifest};
pub use run_sync::{RunOptions, SyncEngine, SyncReport, run_sync};
pub use staging::StagingRegistry;
pub use state::SyncStateTracker;
pub use transfer::{EncryptionStage, TransferFailure, TransferPipeline, TransferReport};
