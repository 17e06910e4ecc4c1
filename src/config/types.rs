//! Configuration types for ssync-rs.
//!
//! This module defines the structures used to represent application configuration
//! as parsed from an INI-format config file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Primitive Types
// =============================================================================

/// Canned access-control policy applied to every uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessPolicy {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
}

impl AccessPolicy {
    /// The S3 canned ACL name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPolicy::Private => "private",
            AccessPolicy::PublicRead => "public-read",
            AccessPolicy::PublicReadWrite => "public-read-write",
            AccessPolicy::AuthenticatedRead => "authenticated-read",
        }
    }
}

/// Digest used for the local checksum manifest.
///
/// MD5 is the default because it is what S3 reports as the ETag of a
/// single-part upload, which is what the checksum diff compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Label written in front of each manifest line, e.g. `MD5(path)= ...`.
    pub fn label(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "MD5",
            ChecksumAlgorithm::Sha256 => "SHA256",
        }
    }
}

// =============================================================================
// S3 Settings (shared across s3 and target sections)
// =============================================================================

/// S3-specific connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}

// =============================================================================
// Config Sections
// =============================================================================

/// [defaults] section - remembers which target a bare `ssync sync` runs.
#[derive(Debug, Clone, Default)]
pub struct DefaultsConfig {
    pub target: Option<String>,
}

/// [sync] section - engine-wide settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding lock and sync-state markers.
    pub state_dir: PathBuf,
    /// Root for encrypted staging copies; each target stages into its own
    /// subdirectory.
    pub staging_dir: PathBuf,
    /// Number of keys requested per listing page.
    pub page_size: u32,
    /// Upper bound on transfers in flight at once.
    pub max_concurrent_uploads: u32,
    pub checksum: ChecksumAlgorithm,
}

/// [target.NAME] section - one local tree mirrored into one bucket.
///
/// Unset values are inherited when the target is resolved by
/// [`ConfigHelper::resolve_target`](super::ConfigHelper::resolve_target).
#[derive(Debug, Clone, Default)]
pub struct TargetSection {
    pub bucket: Option<String>,
    pub local_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    pub exclude: Vec<String>,
    pub access: Option<AccessPolicy>,
    pub reduced_redundancy: bool,
    pub encryption_recipient: Option<String>,
    pub cleanup_delay: Option<Duration>,
    pub settings: S3Settings,
}

// =============================================================================
// Top-Level Config
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: DefaultsConfig,
    pub sync: SyncConfig,
    pub s3: S3Settings,
    pub targets: HashMap<String, TargetSection>,
}
