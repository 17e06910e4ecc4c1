//! Error types for sync operations.

use std::path::PathBuf;

use crate::encrypt::EncryptError;

/// Error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Another run holds the lock for this target.
    #[error(
        "sync for '{target}' is already running ({holder}); remove {} if no sync is in progress",
        .path.display()
    )]
    LockHeld {
        target: String,
        path: PathBuf,
        holder: String,
    },

    /// The configured local root does not exist.
    #[error("local path {} does not exist", .0.display())]
    LocalRootMissing(PathBuf),

    /// The configured bucket does not exist.
    #[error("bucket '{0}' does not exist")]
    BucketNotFound(String),

    /// `complete_run` was called without `begin_run`.
    #[error("sync run was never started")]
    NotStarted,

    /// A manifest line could not be parsed.
    #[error("malformed manifest line {line} in {}: {content:?}", .path.display())]
    Manifest {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// A path handed to the key mapper is outside the local root.
    #[error("{} is not under {}", .path.display(), .root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// An exclude pattern could not be compiled.
    #[error("invalid exclude pattern: {0}")]
    InvalidExclude(#[from] ignore::Error),

    /// Object store error.
    #[error("storage error: {0}")]
    Store(#[from] crate::store::Error),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encrypt(#[from] EncryptError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
