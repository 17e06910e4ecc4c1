//! Pushing the transfer queue to the object store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tracing::{error, info};

use super::error::Result;
use super::key_map::KeyMapper;
use super::manifest::FileRecord;
use super::naming;
use super::staging::StagingRegistry;
use crate::encrypt::Encryptor;
use crate::store::{ObjectStore, PutOptions};

/// Encryption applied to every file before upload.
pub struct EncryptionStage {
    pub encryptor: Arc<dyn Encryptor>,
    pub recipient: String,
    pub staging_dir: PathBuf,
    pub registry: Arc<StagingRegistry>,
}

/// A file that could not be pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub path: String,
    pub message: String,
}

/// Outcome of draining a transfer queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Local paths pushed, in queue order.
    pub pushed: Vec<String>,
    pub failed: Vec<TransferFailure>,
}

impl TransferReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uploads queued files, optionally encrypting them first.
pub struct TransferPipeline {
    store: Arc<dyn ObjectStore>,
    mapper: KeyMapper,
    options: PutOptions,
    encryption: Option<EncryptionStage>,
    max_concurrent: usize,
}

impl TransferPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, mapper: KeyMapper, options: PutOptions) -> Self {
        Self {
            store,
            mapper,
            options,
            encryption: None,
            max_concurrent: 1,
        }
    }

    pub fn with_encryption(mut self, stage: EncryptionStage) -> Self {
        self.encryption = Some(stage);
        self
    }

    /// Number of files in flight at once. Zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Push every record in `queue`.
    ///
    /// A failed file is logged and reported; it never stops the others.
    pub async fn run(&self, queue: Vec<FileRecord>) -> TransferReport {
        let outcomes: Vec<(String, Result<String>)> = stream::iter(queue)
            .map(|record| async move {
                let outcome = self.push_one(Path::new(&record.path)).await;
                (record.path, outcome)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut report = TransferReport::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(_) => report.pushed.push(path),
                Err(e) => {
                    error!("failed to push '{}': {}", path, e);
                    report.failed.push(TransferFailure {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Push one file and return its object key.
    async fn push_one(&self, path: &Path) -> Result<String> {
        info!("pushing '{}'", path.display());
        let key = self.mapper.destination_key(path)?;

        let Some(stage) = &self.encryption else {
            self.store.put_object(&key, path, self.options).await?;
            return Ok(key);
        };

        let staging = naming::staging_file(&stage.staging_dir, path);
        stage.registry.register(&staging);

        if let Err(e) = stage
            .encryptor
            .encrypt(path, &staging, &stage.recipient)
            .await
        {
            stage.registry.mark_returned(&staging);
            return Err(e.into());
        }

        let uploaded = self.store.put_object(&key, &staging, self.options).await;
        stage.registry.mark_returned(&staging);
        uploaded?;

        stage.registry.cleanup_expired().await;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessPolicy;
    use crate::encrypt::{KeyPair, SealedBoxEncryptor, open_sealed};
    use crate::store::MemoryObjectStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(path: &Path) -> FileRecord {
        FileRecord::unchecked(path.to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn test_push_with_prefix_and_options() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("css")).unwrap();
        std::fs::write(root.join("css/site.css"), b"body{}").unwrap();

        let store = Arc::new(MemoryObjectStore::new("bucket"));
        let options = PutOptions {
            access: AccessPolicy::PublicRead,
            reduced_redundancy: true,
        };
        let pipeline = TransferPipeline::new(
            store.clone(),
            KeyMapper::new(root, Some("www"), false),
            options,
        );

        let report = pipeline.run(vec![record(&root.join("css/site.css"))]).await;
        assert!(report.is_clean());
        assert_eq!(report.pushed.len(), 1);

        let stored = store.object("www/css/site.css").unwrap();
        assert_eq!(stored.data, b"body{}");
        assert_eq!(stored.options, options);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for name in ["a", "b", "c"] {
            std::fs::write(root.join(name), name).unwrap();
        }

        let store = Arc::new(MemoryObjectStore::builder("bucket").with_failing_key("b").build());
        let pipeline = TransferPipeline::new(
            store.clone(),
            KeyMapper::new(root, None, false),
            PutOptions::default(),
        )
        .with_max_concurrent(2);

        let queue = ["a", "b", "c"].iter().map(|n| record(&root.join(n))).collect();
        let report = pipeline.run(queue).await;

        assert_eq!(report.pushed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, root.join("b").to_string_lossy());
        assert_eq!(store.keys(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryObjectStore::new("bucket"));
        let pipeline = TransferPipeline::new(
            store.clone(),
            KeyMapper::new(temp.path(), None, false),
            PutOptions::default(),
        );

        let report = pipeline.run(vec![record(&temp.path().join("gone"))]).await;
        assert_eq!(report.failed.len(), 1);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_encrypted_push_uses_staging_copy() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        let staging_dir = temp.path().join("staging");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("secret.txt"), b"plain").unwrap();

        let keys = KeyPair::generate();
        let registry = Arc::new(StagingRegistry::new(Duration::from_secs(3600)));
        let store = Arc::new(MemoryObjectStore::new("bucket"));
        let pipeline = TransferPipeline::new(
            store.clone(),
            KeyMapper::new(&root, None, true),
            PutOptions::default(),
        )
        .with_encryption(EncryptionStage {
            encryptor: Arc::new(SealedBoxEncryptor::new()),
            recipient: keys.public_hex(),
            staging_dir: staging_dir.clone(),
            registry: registry.clone(),
        });

        let report = pipeline.run(vec![record(&root.join("secret.txt"))]).await;
        assert!(report.is_clean());

        let stored = store.object("secret.txt.enc").unwrap();
        assert_eq!(open_sealed(&stored.data, &keys.secret).unwrap(), b"plain");

        // Still young, so the copy waits for the final cleanup.
        assert_eq!(registry.len(), 1);
        assert!(naming::staging_file(&staging_dir, &root.join("secret.txt")).exists());
    }

    fn encrypting_pipeline(
        store: Arc<MemoryObjectStore>,
        root: &Path,
        staging_dir: &Path,
        recipient: String,
        registry: Arc<StagingRegistry>,
    ) -> TransferPipeline {
        TransferPipeline::new(store, KeyMapper::new(root, None, true), PutOptions::default())
            .with_encryption(EncryptionStage {
                encryptor: Arc::new(SealedBoxEncryptor::new()),
                recipient,
                staging_dir: staging_dir.to_path_buf(),
                registry,
            })
    }

    #[tokio::test]
    async fn test_encrypted_push_of_deeply_nested_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        let nested: PathBuf = (0..20).map(|i| format!("dir-segment-{:02}", i)).collect();
        let dir = root.join(&nested);
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("report.txt");
        std::fs::write(&source, b"quarterly").unwrap();
        assert!(source.as_os_str().len() > 255);

        let keys = KeyPair::generate();
        let store = Arc::new(MemoryObjectStore::new("bucket"));
        let registry = Arc::new(StagingRegistry::new(Duration::from_secs(3600)));
        let pipeline = encrypting_pipeline(
            store.clone(),
            &root,
            &temp.path().join("staging"),
            keys.public_hex(),
            registry,
        );

        let report = pipeline.run(vec![record(&source)]).await;
        assert!(report.is_clean(), "{:?}", report.failed);

        let key = format!("{}/report.txt.enc", nested.to_string_lossy());
        let stored = store.object(&key).unwrap();
        assert_eq!(open_sealed(&stored.data, &keys.secret).unwrap(), b"quarterly");
    }

    #[tokio::test]
    async fn test_expired_copies_are_removed_between_pushes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        let staging_dir = temp.path().join("staging");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("first.txt"), b"one").unwrap();
        std::fs::write(root.join("second.txt"), b"two").unwrap();

        let keys = KeyPair::generate();
        let store = Arc::new(MemoryObjectStore::new("bucket"));
        let registry = Arc::new(StagingRegistry::new(Duration::ZERO));
        let pipeline = encrypting_pipeline(
            store.clone(),
            &root,
            &staging_dir,
            keys.public_hex(),
            registry.clone(),
        );

        let queue = vec![record(&root.join("first.txt")), record(&root.join("second.txt"))];
        let report = pipeline.run(queue).await;
        assert!(report.is_clean());
        assert_eq!(store.keys(), vec!["first.txt.enc", "second.txt.enc"]);

        assert!(!naming::staging_file(&staging_dir, &root.join("first.txt")).exists());
        assert!(registry.len() <= 1);
    }

    #[tokio::test]
    async fn test_bad_recipient_fails_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a"), b"a").unwrap();

        let registry = Arc::new(StagingRegistry::new(Duration::ZERO));
        let store = Arc::new(MemoryObjectStore::new("bucket"));
        let pipeline = TransferPipeline::new(
            store.clone(),
            KeyMapper::new(temp.path(), None, true),
            PutOptions::default(),
        )
        .with_encryption(EncryptionStage {
            encryptor: Arc::new(SealedBoxEncryptor::new()),
            recipient: "nope".to_string(),
            staging_dir: temp.path().join("staging"),
            registry,
        });

        let report = pipeline.run(vec![record(&temp.path().join("a"))]).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(store.put_calls(), 0);
    }
}
