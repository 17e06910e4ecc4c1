//! Configuration helper for interpreting config values.
//!
//! The `ConfigHelper` wraps a `Config` and resolves a named target into a
//! [`TargetConfig`] with every inherited value filled in. The sync engine only
//! ever sees the resolved form.

use std::path::PathBuf;
use std::time::Duration;

use super::read_config::{ConfigError, Result};
use super::{AccessPolicy, ChecksumAlgorithm, Config, S3Settings};

/// Delay before an encrypted staging copy may be deleted.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(10);

/// Fully resolved settings for one sync target.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Target identity; scopes the lock and the sync-state markers.
    pub name: String,
    pub bucket: String,
    pub local_root: PathBuf,
    /// Key prefix replacing `local_root` in destination keys.
    pub remote_prefix: Option<String>,
    /// Gitignore-style exclusion patterns, relative to `local_root`.
    pub exclude: Vec<String>,
    pub access: AccessPolicy,
    pub reduced_redundancy: bool,
    /// Hex-encoded public key; `None` disables encryption.
    pub encryption_recipient: Option<String>,
    pub cleanup_delay: Duration,
    pub s3: S3Settings,
    pub state_dir: PathBuf,
    /// Staging root; runs stage into a per-target subdirectory of it.
    pub staging_dir: PathBuf,
    pub page_size: u32,
    pub max_concurrent_uploads: u32,
    pub checksum: ChecksumAlgorithm,
}

impl TargetConfig {
    /// Minimal target with engine defaults, mostly useful for tests and embedding.
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        local_root: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        let state_dir = state_dir.into();
        Self {
            name: name.into(),
            bucket: bucket.into(),
            local_root: local_root.into(),
            remote_prefix: None,
            exclude: Vec::new(),
            access: AccessPolicy::default(),
            reduced_redundancy: false,
            encryption_recipient: None,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            s3: S3Settings::default(),
            staging_dir: state_dir.join("staging"),
            state_dir,
            page_size: 1000,
            max_concurrent_uploads: 1,
            checksum: ChecksumAlgorithm::default(),
        }
    }

    /// Whether files are encrypted before upload.
    pub fn encrypts(&self) -> bool {
        self.encryption_recipient.is_some()
    }
}

/// Helper for interpreting configuration values.
#[derive(Debug, Clone)]
pub struct ConfigHelper {
    config: Config,
}

impl ConfigHelper {
    /// Create a new ConfigHelper wrapping the given config.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get a reference to the underlying config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Name of the target used when none is given explicitly.
    pub fn default_target(&self) -> Option<&str> {
        self.config.defaults.target.as_deref()
    }

    /// Resolve a target by name, falling back to the default target.
    ///
    /// Returns `Ok(None)` when no name is given and no default is configured,
    /// i.e. there is nothing to sync yet.
    pub fn resolve_target(&self, name: Option<&str>) -> Result<Option<TargetConfig>> {
        let Some(name) = name.or(self.default_target()) else {
            return Ok(None);
        };

        let section = self
            .config
            .targets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))?;

        let local_root =
            section
                .local_path
                .clone()
                .ok_or_else(|| ConfigError::MissingRequiredField {
                    section: format!("target.{}", name),
                    field: "local_path".to_string(),
                })?;

        let sync = &self.config.sync;
        Ok(Some(TargetConfig {
            name: name.to_string(),
            bucket: section.bucket.clone().unwrap_or_else(|| name.to_string()),
            local_root,
            remote_prefix: section
                .remote_path
                .as_deref()
                .map(|p| p.trim_matches('/'))
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            exclude: section.exclude.clone(),
            access: section.access.unwrap_or_default(),
            reduced_redundancy: section.reduced_redundancy,
            encryption_recipient: section.encryption_recipient.clone(),
            cleanup_delay: section.cleanup_delay.unwrap_or(DEFAULT_CLEANUP_DELAY),
            s3: S3Settings {
                endpoint_url: section
                    .settings
                    .endpoint_url
                    .clone()
                    .or_else(|| self.config.s3.endpoint_url.clone()),
                region: section
                    .settings
                    .region
                    .clone()
                    .or_else(|| self.config.s3.region.clone()),
            },
            state_dir: sync.state_dir.clone(),
            staging_dir: sync.staging_dir.clone(),
            page_size: sync.page_size,
            max_concurrent_uploads: sync.max_concurrent_uploads,
            checksum: sync.checksum,
        }))
    }
}

impl From<Config> for ConfigHelper {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}
