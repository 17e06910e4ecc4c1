//! Configuration module.

mod config_helper;
mod read_config;
mod types;

pub use config_helper::{ConfigHelper, DEFAULT_CLEANUP_DELAY, TargetConfig};
pub use read_config::{ConfigError, ConfigResult, ConfigSource, read_config};
pub use types::{
    AccessPolicy, ChecksumAlgorithm, Config, DefaultsConfig, S3Settings, SyncConfig,
    TargetSection,
};
