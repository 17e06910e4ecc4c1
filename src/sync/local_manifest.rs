//! Checksum manifest of the local tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::error::Result;
use super::manifest::{FileRecord, parse_manifest, write_manifest};
use crate::config::ChecksumAlgorithm;
use crate::local::{ExcludeRules, walk_files};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Walks a tree and digests every file in it.
#[async_trait]
pub trait ChecksumWalker: Send + Sync {
    /// Algorithm whose digests [`walk`](Self::walk) returns.
    fn algorithm(&self) -> ChecksumAlgorithm;

    /// Digest every regular file under `root` not excluded by `rules`, in
    /// walk order. Paths are absolute.
    async fn walk(&self, root: &Path, rules: &ExcludeRules) -> Result<Vec<(PathBuf, String)>>;
}

/// [`ChecksumWalker`] reading files directly from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsChecksumWalker {
    algorithm: ChecksumAlgorithm,
}

impl FsChecksumWalker {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self { algorithm }
    }
}

/// Hex digest of a file's contents, read in fixed-size chunks.
pub async fn digest_file(path: &Path, algorithm: ChecksumAlgorithm) -> std::io::Result<String> {
    match algorithm {
        ChecksumAlgorithm::Md5 => digest_with::<Md5>(path).await,
        ChecksumAlgorithm::Sha256 => digest_with::<Sha256>(path).await,
    }
}

async fn digest_with<D: Digest + Send>(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl ChecksumWalker for FsChecksumWalker {
    fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    async fn walk(&self, root: &Path, rules: &ExcludeRules) -> Result<Vec<(PathBuf, String)>> {
        let files = walk_files(root, rules).await?;
        let mut digests = Vec::with_capacity(files.len());
        for file in files {
            let digest = digest_file(&file.path, self.algorithm).await?;
            digests.push((file.path, digest));
        }
        Ok(digests)
    }
}

/// Builds the local manifest file for a checksum comparison.
pub struct LocalManifestBuilder {
    walker: Arc<dyn ChecksumWalker>,
}

impl LocalManifestBuilder {
    pub fn new(walker: Arc<dyn ChecksumWalker>) -> Self {
        Self { walker }
    }

    /// Digest the tree under `root` into `manifest_path` and return the path.
    pub async fn build(
        &self,
        root: &Path,
        rules: &ExcludeRules,
        manifest_path: &Path,
    ) -> Result<PathBuf> {
        let digests = self.walker.walk(root, rules).await?;
        let entries: Vec<(String, String)> = digests
            .into_iter()
            .map(|(path, digest)| (path.to_string_lossy().into_owned(), digest))
            .collect();

        write_manifest(manifest_path, self.walker.algorithm().label(), &entries).await?;
        debug!(
            "wrote {} entries to {}",
            entries.len(),
            manifest_path.display()
        );
        Ok(manifest_path.to_path_buf())
    }

    /// Build the manifest file and read it back.
    pub async fn build_records(
        &self,
        root: &Path,
        rules: &ExcludeRules,
        manifest_path: &Path,
    ) -> Result<Vec<FileRecord>> {
        let path = self.build(root, rules, manifest_path).await?;
        parse_manifest(&path).await
    }
}
