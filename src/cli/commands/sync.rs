//! The sync command.

use std::sync::Arc;

use clap::Args;
use tracing::{info, warn};

use crate::cli::{CliError, GlobalArgs, Result};
use crate::config::{ConfigHelper, TargetConfig, read_config};
use crate::store::{S3ObjectStore, S3ObjectStoreConfig};
use crate::sync::{RunOptions, SyncReport, run_sync};

/// Arguments for the sync command.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Target to sync; defaults to `[defaults] target` from the configuration.
    pub target: Option<String>,

    /// Forget previous runs and compare checksums of every file.
    #[arg(short, long)]
    pub force: bool,
}

impl SyncArgs {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let target = resolve_target(global, self.target.as_deref())?;
        info!(
            "syncing '{}' from {} to s3://{}",
            target.name,
            target.local_root.display(),
            target.bucket
        );

        let store = S3ObjectStore::new(store_config(&target)).await;
        let report = run_sync(target, Arc::new(store), RunOptions { force: self.force }).await?;
        print_report(&report);
        Ok(())
    }
}

fn resolve_target(global: &GlobalArgs, name: Option<&str>) -> Result<TargetConfig> {
    let result = read_config(&global.to_config_source())?;
    for warning in &result.warnings {
        warn!("{}", warning);
    }

    ConfigHelper::new(result.config)
        .resolve_target(name)?
        .ok_or_else(|| {
            CliError::Other(
                "no target given and no default target configured; name one on the command \
                 line or set [defaults] target in ~/.ssyncconfig"
                    .to_string(),
            )
        })
}

fn store_config(target: &TargetConfig) -> S3ObjectStoreConfig {
    let mut config = S3ObjectStoreConfig::new(&target.bucket);
    if let Some(endpoint) = &target.s3.endpoint_url {
        config = config.with_endpoint_url(endpoint);
    }
    if let Some(region) = &target.s3.region {
        config = config.with_region(region);
    }
    config
}

fn print_report(report: &SyncReport) {
    println!(
        "{}: pushed {} of {} files",
        report.target,
        report.transfer.pushed.len(),
        report.queued
    );
    for failure in &report.transfer.failed {
        println!("  failed: {} ({})", failure.path, failure.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Settings;

    #[test]
    fn test_store_config_from_target() {
        let mut target = TargetConfig::new("www", "www-bucket", "/var/www", "/tmp/state");
        target.s3 = S3Settings {
            endpoint_url: Some("http://localhost:9000".to_string()),
            region: Some("eu-west-1".to_string()),
        };

        let config = store_config(&target);
        assert_eq!(config.bucket, "www-bucket");
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_resolve_target_from_overrides() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_file = temp.path().join("ssync.ini");
        std::fs::write(
            &config_file,
            "[defaults]\ntarget = www\n\n[target.www]\nlocal_path = /var/www\nbucket = site\n",
        )
        .unwrap();

        let global = GlobalArgs {
            config_file: Some(config_file),
            config_overrides: vec![("target.www.remote_path".to_string(), "/pub/".to_string())],
            ..Default::default()
        };

        let target = resolve_target(&global, None).unwrap();
        assert_eq!(target.name, "www");
        assert_eq!(target.bucket, "site");
        assert_eq!(target.remote_prefix.as_deref(), Some("pub"));

        assert!(matches!(
            resolve_target(&global, Some("other")),
            Err(CliError::Config(_))
        ));
    }
}
