//! Configuration file reading and parsing.
//!
//! This module handles locating, reading, and parsing INI-format configuration files,
//! with support for layered overrides.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use configparser::ini::Ini;
use thiserror::Error;

use super::{
    AccessPolicy, ChecksumAlgorithm, Config, DefaultsConfig, S3Settings, SyncConfig,
    TargetSection,
};

// =============================================================================
// Constants - Default Values
// =============================================================================

const DEFAULT_STATE_DIRNAME: &str = ".ssync";
const DEFAULT_STAGING_DIRNAME: &str = "ssync-staging";
const DEFAULT_PAGE_SIZE: u32 = 1000;
const DEFAULT_MAX_CONCURRENT_UPLOADS: u32 = 1;

const ENV_CONFIG_FILE: &str = "SSYNC_CONFIG_FILE";
const DEFAULT_CONFIG_FILENAME: &str = ".ssyncconfig";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid integer '{value}': {source}")]
    InvalidInteger {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid boolean '{value}' for key '{key}'")]
    InvalidBoolean { key: String, value: String },

    #[error("invalid value '{value}' for key '{key}': {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("invalid override key '{key}': {message}")]
    InvalidOverrideKey { key: String, message: String },

    #[error("missing required field '{field}' in section '{section}'")]
    MissingRequiredField { section: String, field: String },

    #[error("no target named '{0}' is configured")]
    UnknownTarget(String),
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// ConfigSource
// =============================================================================

/// Specifies how to locate and layer configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Explicit config file path from CLI. If specified and doesn't exist, error.
    /// If None, fall back to SSYNC_CONFIG_FILE env var, then ~/.ssyncconfig.
    pub config_file: Option<PathBuf>,

    /// Additional override config file (layered on top of base config).
    pub override_file: Option<PathBuf>,

    /// Individual key=value overrides (applied last).
    /// Keys use dot-notation: "sync.page_size", "target.www.bucket"
    pub overrides: Vec<(String, String)>,
}

// =============================================================================
// Value Parsing
// =============================================================================

fn parse_bool_value(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_u32_value(value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidInteger {
            value: value.to_string(),
            source: e,
        })
}

fn parse_positive_u32(key: &str, value: &str) -> Result<u32> {
    let parsed = parse_u32_value(value)?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

/// Parse a delay given in whole seconds.
fn parse_seconds(value: &str) -> Result<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidInteger {
            value: value.to_string(),
            source: e,
        })?;
    Ok(Duration::from_secs(secs))
}

/// Parse an access policy. The single-letter forms are accepted for
/// compatibility with older configurations.
pub(crate) fn parse_access(key: &str, value: &str) -> Result<AccessPolicy> {
    match value.trim().to_lowercase().replace('_', "-").as_str() {
        "p" | "private" => Ok(AccessPolicy::Private),
        "r" | "public-read" => Ok(AccessPolicy::PublicRead),
        "w" | "public-read-write" => Ok(AccessPolicy::PublicReadWrite),
        "a" | "authenticated-read" => Ok(AccessPolicy::AuthenticatedRead),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            message: "expected private, public-read, public-read-write or authenticated-read"
                .to_string(),
        }),
    }
}

fn parse_checksum(key: &str, value: &str) -> Result<ChecksumAlgorithm> {
    match value.trim().to_lowercase().as_str() {
        "md5" => Ok(ChecksumAlgorithm::Md5),
        "sha256" => Ok(ChecksumAlgorithm::Sha256),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            message: "expected md5 or sha256".to_string(),
        }),
    }
}

/// Parse a comma-separated string into a Vec of trimmed strings.
fn parse_comma_separated(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Expand a leading `~/` against the home directory.
fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}

// =============================================================================
// Config File Resolution
// =============================================================================

/// Information about how the config file was resolved.
#[derive(Debug)]
pub struct ResolvedConfigFile {
    /// The path to the config file, if one was found.
    pub path: Option<PathBuf>,
    /// Warning message if env var pointed to nonexistent file.
    pub warning: Option<String>,
}

/// Resolve which config file to use based on the ConfigSource and environment.
fn resolve_config_file(source: &ConfigSource) -> Result<ResolvedConfigFile> {
    if let Some(ref path) = source.config_file {
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path.clone()),
                warning: None,
            });
        }
        return Err(ConfigError::FileNotFound(path.clone()));
    }

    if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path),
                warning: None,
            });
        }
        return Ok(ResolvedConfigFile {
            path: None,
            warning: Some(format!(
                "config file specified by {} does not exist: {}",
                ENV_CONFIG_FILE, env_path
            )),
        });
    }

    if let Some(home) = home_dir() {
        let default_path = home.join(DEFAULT_CONFIG_FILENAME);
        if default_path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(default_path),
                warning: None,
            });
        }
    }

    Ok(ResolvedConfigFile {
        path: None,
        warning: None,
    })
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

// =============================================================================
// Default Config
// =============================================================================

/// Create a Config with all default values.
fn default_config() -> Config {
    let state_dir = home_dir()
        .map(|home| home.join(DEFAULT_STATE_DIRNAME))
        .unwrap_or_else(|| env::temp_dir().join(DEFAULT_STATE_DIRNAME));

    Config {
        defaults: DefaultsConfig::default(),
        sync: SyncConfig {
            state_dir,
            staging_dir: env::temp_dir().join(DEFAULT_STAGING_DIRNAME),
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            checksum: ChecksumAlgorithm::default(),
        },
        s3: S3Settings::default(),
        targets: HashMap::new(),
    }
}

// =============================================================================
// INI Parsing
// =============================================================================

/// Apply an INI file's contents to a Config, layering on top of existing values.
fn apply_ini_to_config(config: &mut Config, ini: &Ini) -> Result<()> {
    for section_name in ini.sections() {
        let Some(values) = ini.get_map_ref().get(&section_name) else {
            continue;
        };

        for (key, value) in values {
            let Some(value) = value else {
                continue;
            };
            let dotted = format!("{}.{}", section_name, key);
            apply_override(config, &dotted, value)?;
        }
    }

    Ok(())
}

/// Load and parse an INI file.
fn load_ini(path: &Path) -> Result<Ini> {
    let mut ini = Ini::new_cs();
    ini.load(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e,
    })?;
    Ok(ini)
}

// =============================================================================
// Override Application
// =============================================================================

/// Apply a single key=value setting to the config.
///
/// INI sections are routed through here as well, so `[target.www]` with
/// `bucket = x` behaves exactly like the override `target.www.bucket=x`.
/// Target names may contain dots (`target.www.example.com.bucket`); the
/// parameter is always the last component.
fn apply_override(config: &mut Config, key: &str, value: &str) -> Result<()> {
    if let Some(rest) = key.strip_prefix("target.") {
        return match rest.rsplit_once('.') {
            Some((name, param)) if !name.is_empty() && !param.is_empty() => {
                apply_target_override(config, name, param, value)
            }
            _ => Err(ConfigError::InvalidOverrideKey {
                key: key.to_string(),
                message: "expected target.<name>.<parameter>".to_string(),
            }),
        };
    }

    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["defaults", param] => apply_defaults_override(config, param, value),
        ["sync", param] => apply_sync_override(config, param, value),
        ["s3", param] => apply_s3_override(&mut config.s3, "s3", param, value),
        _ => Err(ConfigError::InvalidOverrideKey {
            key: key.to_string(),
            message: "unrecognized key format".to_string(),
        }),
    }
}

fn apply_defaults_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "target" | "last_used_target" => {
            let value = value.trim();
            config.defaults.target = (!value.is_empty()).then(|| value.to_string());
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("defaults.{}", param),
            message: "unknown parameter".to_string(),
        }),
    }
}

fn apply_sync_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    let key = format!("sync.{}", param);
    match param {
        "state_dir" => config.sync.state_dir = expand_home(value.trim()),
        "staging_dir" => config.sync.staging_dir = expand_home(value.trim()),
        "page_size" => config.sync.page_size = parse_positive_u32(&key, value)?,
        "max_concurrent_uploads" => {
            config.sync.max_concurrent_uploads = parse_positive_u32(&key, value)?
        }
        "checksum" => config.sync.checksum = parse_checksum(&key, value)?,
        _ => {
            return Err(ConfigError::InvalidOverrideKey {
                key,
                message: "unknown parameter".to_string(),
            });
        }
    }
    Ok(())
}

fn apply_s3_override(
    settings: &mut S3Settings,
    section: &str,
    param: &str,
    value: &str,
) -> Result<()> {
    match param {
        "endpoint_url" => {
            settings.endpoint_url = Some(value.trim().to_string());
            Ok(())
        }
        "region" => {
            settings.region = Some(value.trim().to_string());
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("{}.{}", section, param),
            message: "unknown parameter".to_string(),
        }),
    }
}

fn apply_target_override(config: &mut Config, name: &str, param: &str, value: &str) -> Result<()> {
    let section = format!("target.{}", name);
    let key = format!("{}.{}", section, param);
    let target = config.targets.entry(name.to_string()).or_default();
    let trimmed = value.trim();

    match param {
        "bucket" => target.bucket = Some(trimmed.to_string()),
        "local_path" | "local_file_path" => target.local_path = Some(expand_home(trimmed)),
        "remote_path" | "s3_file_path" => {
            target.remote_path = (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        "exclude" => target.exclude = parse_comma_separated(trimmed),
        "access" => target.access = Some(parse_access(&key, trimmed)?),
        "reduced_redundancy" => target.reduced_redundancy = parse_bool_value(&key, trimmed)?,
        "encryption_recipient" => {
            target.encryption_recipient = (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        "cleanup_delay" => target.cleanup_delay = Some(parse_seconds(trimmed)?),
        _ => return apply_s3_override(&mut target.settings, &section, param, value),
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Result of reading configuration, including any warnings.
#[derive(Debug)]
pub struct ConfigResult {
    /// The parsed configuration.
    pub config: Config,
    /// Any warnings generated during config loading.
    pub warnings: Vec<String>,
}

/// Read and parse configuration from the specified sources.
///
/// Configuration is layered in this order:
/// 1. Built-in defaults
/// 2. Base config file (from CLI, env var, or ~/.ssyncconfig)
/// 3. Override config file (if specified)
/// 4. Individual overrides (applied last)
pub fn read_config(source: &ConfigSource) -> Result<ConfigResult> {
    let mut warnings = Vec::new();
    let mut config = default_config();

    let resolved = resolve_config_file(source)?;
    if let Some(warning) = resolved.warning {
        warnings.push(warning);
    }
    if let Some(ref path) = resolved.path {
        let ini = load_ini(path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    if let Some(ref override_path) = source.override_file {
        if !override_path.exists() {
            return Err(ConfigError::FileNotFound(override_path.clone()));
        }
        let ini = load_ini(override_path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    for (key, value) in &source.overrides {
        apply_override(&mut config, key, value)?;
    }

    Ok(ConfigResult { config, warnings })
}

// =============================================================================
// Tests
// =============================================================================
