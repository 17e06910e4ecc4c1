//! Encryption of files before they leave the machine.
//!
//! When a target names an encryption recipient, every file is sealed to a
//! staging copy and the staging copy is what gets uploaded. The engine talks
//! to the [`Encryptor`] trait so the cipher can be swapped or mocked.

mod sealed_box;

pub use sealed_box::{
    CHUNK_SIZE, KeyPair, SealedBoxEncryptor, open_sealed, open_sealed_file, open_stream,
    parse_public_key, parse_secret_key, seal, seal_stream,
};

use async_trait::async_trait;
use std::path::Path;

/// Suffix appended to the destination key of encrypted uploads.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Errors that can occur while encrypting or decrypting.
#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Result type for encryption operations.
pub type Result<T> = std::result::Result<T, EncryptError>;

/// Produces an encrypted copy of a file for a recipient.
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// Encrypt `source` for `recipient`, writing the ciphertext to `staging`.
    ///
    /// `staging` is overwritten if it exists; its parent directory is created
    /// as needed.
    async fn encrypt(&self, source: &Path, staging: &Path, recipient: &str) -> Result<()>;
}
