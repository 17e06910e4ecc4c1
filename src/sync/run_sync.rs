//! Run sync functionality.
//!
//! A run for one target goes through these steps:
//!
//! 1. Acquire the target lock (held until the run ends, on every path)
//! 2. Pre-sync checks: local root exists, bucket exists
//! 3. Clear previous state when forced
//! 4. Pick the strategy: time-based if a clean run is recorded, else checksum
//! 5. Record the run start, compute the transfer queue
//! 6. Push the queue, removing expired staging copies as it goes
//! 7. Wait out the cleanup delay and remove the remaining staging copies
//! 8. Record the run as completed

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info, warn};

use super::diff::{DiffStrategy, checksum_diff, localize_remote, modified_since};
use super::error::{Result, SyncError};
use super::key_map::KeyMapper;
use super::local_manifest::{ChecksumWalker, FsChecksumWalker, LocalManifestBuilder};
use super::lock::LockManager;
use super::manifest::FileRecord;
use super::naming;
use super::remote_manifest::fetch_remote_manifest;
use super::staging::StagingRegistry;
use super::state::SyncStateTracker;
use super::transfer::{EncryptionStage, TransferPipeline, TransferReport};
use crate::config::TargetConfig;
use crate::encrypt::{Encryptor, SealedBoxEncryptor};
use crate::local::ExcludeRules;
use crate::store::{ObjectStore, PutOptions};

/// Options for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Forget previous runs and compare checksums.
    pub force: bool,
}

/// Result of a run that reached the end.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub target: String,
    pub strategy: DiffStrategy,
    /// Number of files the diff selected.
    pub queued: usize,
    pub transfer: TransferReport,
    pub started_at: DateTime<Utc>,
}

/// Values resolved once at the start of a run and shared by every step.
struct SyncContext {
    /// Canonical local root.
    root: PathBuf,
    rules: ExcludeRules,
    mapper: KeyMapper,
    recipient: Option<String>,
}

/// Runs syncs for one target against one object store.
pub struct SyncEngine {
    target: TargetConfig,
    store: Arc<dyn ObjectStore>,
    walker: Arc<dyn ChecksumWalker>,
    encryptor: Arc<dyn Encryptor>,
    manifest_path: PathBuf,
}

impl SyncEngine {
    pub fn new(target: TargetConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            walker: Arc::new(FsChecksumWalker::new(target.checksum)),
            encryptor: Arc::new(SealedBoxEncryptor::new()),
            manifest_path: naming::local_manifest_file(&target.name),
            target,
            store,
        }
    }

    pub fn with_checksum_walker(mut self, walker: Arc<dyn ChecksumWalker>) -> Self {
        self.walker = walker;
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    /// Where the temporary local manifest is written.
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Run one sync.
    ///
    /// Fatal conditions return an error and leave the previous `completed`
    /// marker untouched. Per-file failures are listed in the report and do
    /// not stop the run from completing.
    pub async fn run(&self, options: RunOptions) -> Result<SyncReport> {
        let lock = LockManager::new(&self.target.state_dir).acquire(Some(&self.target.name))?;

        info!("performing pre-sync checks");
        let context = self.prepare().await?;

        let mut tracker = SyncStateTracker::new(&self.target.state_dir, &self.target.name);
        if options.force {
            info!("clearing previous sync state");
            tracker.clear_state().await?;
        }

        let strategy = match tracker.completed_at().await? {
            Some(since) => DiffStrategy::TimeBased { since },
            None => DiffStrategy::ChecksumBased,
        };
        let started_at = tracker.begin_run().await?;

        let queue = self.transfer_queue(&context, strategy).await?;
        info!("{} files to push", queue.len());
        let queued = queue.len();

        let registry = Arc::new(StagingRegistry::new(self.target.cleanup_delay));
        let transfer = self
            .pipeline(&context, registry.clone())
            .run(queue)
            .await;

        if registry.had_encryption() {
            let removed = registry.cleanup_all().await;
            debug!("removed {} staging files", removed);
        }

        tracker.complete_run().await?;
        lock.release()?;

        if transfer.is_clean() {
            info!("sync complete");
        } else {
            warn!(
                "sync complete with {} failed files; run with --force to retry them",
                transfer.failed.len()
            );
        }

        Ok(SyncReport {
            target: self.target.name.clone(),
            strategy,
            queued,
            transfer,
            started_at,
        })
    }

    async fn prepare(&self) -> Result<SyncContext> {
        let root = match fs::canonicalize(&self.target.local_root).await {
            Ok(root) => root,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::LocalRootMissing(self.target.local_root.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if !fs::metadata(&root).await?.is_dir() {
            return Err(SyncError::LocalRootMissing(self.target.local_root.clone()));
        }

        if !self.store.bucket_exists().await? {
            return Err(SyncError::BucketNotFound(self.store.bucket().to_string()));
        }

        let rules = ExcludeRules::new(&root, &self.target.exclude)?;
        let recipient = self
            .target
            .encryption_recipient
            .as_deref()
            .map(str::trim)
            .filter(|recipient| !recipient.is_empty())
            .map(str::to_string);
        let mapper = KeyMapper::new(
            &root,
            self.target.remote_prefix.as_deref(),
            recipient.is_some(),
        );

        Ok(SyncContext {
            root,
            rules,
            mapper,
            recipient,
        })
    }

    async fn transfer_queue(
        &self,
        context: &SyncContext,
        strategy: DiffStrategy,
    ) -> Result<Vec<FileRecord>> {
        match strategy {
            DiffStrategy::TimeBased { since } => {
                info!("performing time based comparison");
                debug!("picking up files modified after {}", since.to_rfc3339());
                modified_since(&context.root, &context.rules, since).await
            }
            DiffStrategy::ChecksumBased => {
                info!("performing checksum comparison");
                info!("generating local manifest");
                let builder = LocalManifestBuilder::new(self.walker.clone());
                let local = builder
                    .build_records(&context.root, &context.rules, &self.manifest_path)
                    .await;
                remove_manifest(&self.manifest_path).await;
                let local = local?;

                info!("traversing bucket for remote manifest");
                let remote = fetch_remote_manifest(self.store.as_ref(), self.target.page_size).await?;
                let remote = localize_remote(remote, &context.mapper);

                Ok(checksum_diff(&local, &remote))
            }
        }
    }

    fn pipeline(&self, context: &SyncContext, registry: Arc<StagingRegistry>) -> TransferPipeline {
        let options = PutOptions {
            access: self.target.access,
            reduced_redundancy: self.target.reduced_redundancy,
        };
        let pipeline = TransferPipeline::new(self.store.clone(), context.mapper.clone(), options)
            .with_max_concurrent(self.target.max_concurrent_uploads as usize);

        match &context.recipient {
            Some(recipient) => pipeline.with_encryption(EncryptionStage {
                encryptor: self.encryptor.clone(),
                recipient: recipient.clone(),
                staging_dir: naming::target_staging_dir(
                    &self.target.staging_dir,
                    &self.target.name,
                ),
                registry,
            }),
            None => pipeline,
        }
    }
}

async fn remove_manifest(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove manifest {}: {}", path.display(), e),
    }
}

/// Run one sync of `target` against `store` with the default collaborators.
pub async fn run_sync(
    target: TargetConfig,
    store: Arc<dyn ObjectStore>,
    options: RunOptions,
) -> Result<SyncReport> {
    SyncEngine::new(target, store).run(options).await
}

// =============================================================================
// Tests
// =============================================================================
