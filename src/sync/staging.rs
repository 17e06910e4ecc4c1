//! Tracking and removal of encrypted staging copies.
//!
//! Each staging copy is registered when its file is encrypted and marked once
//! the upload call for it has returned. After every successful push the
//! registry deletes returned copies older than the cleanup delay; at the end
//! of a run it waits out the delay and deletes whatever is left.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct StagingEntry {
    created_at: Instant,
    upload_returned: bool,
}

#[derive(Debug, Default)]
struct Registry {
    entries: HashMap<PathBuf, StagingEntry>,
    last_encryption: Option<Instant>,
}

/// Staging copies of one run awaiting deletion.
#[derive(Debug)]
pub struct StagingRegistry {
    delay: Duration,
    inner: Mutex<Registry>,
}

impl StagingRegistry {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: Mutex::new(Registry::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a staging copy created now.
    pub fn register(&self, staging_path: &Path) {
        self.register_at(staging_path, Instant::now());
    }

    /// Register a staging copy created at `created_at`.
    pub fn register_at(&self, staging_path: &Path, created_at: Instant) {
        let mut registry = self.lock();
        registry.entries.insert(
            staging_path.to_path_buf(),
            StagingEntry {
                created_at,
                upload_returned: false,
            },
        );
        registry.last_encryption = Some(match registry.last_encryption {
            Some(last) => last.max(created_at),
            None => created_at,
        });
    }

    /// Record that the upload of `staging_path` has returned.
    pub fn mark_returned(&self, staging_path: &Path) {
        if let Some(entry) = self.lock().entries.get_mut(staging_path) {
            entry.upload_returned = true;
        }
    }

    /// Whether anything was encrypted during this run.
    pub fn had_encryption(&self) -> bool {
        self.lock().last_encryption.is_some()
    }

    /// Number of copies not yet removed.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return returned entries older than the delay at `now`.
    pub fn take_expired(&self, now: Instant) -> Vec<PathBuf> {
        let mut registry = self.lock();
        let expired: Vec<PathBuf> = registry
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.upload_returned && now.saturating_duration_since(entry.created_at) > self.delay
            })
            .map(|(path, _)| path.clone())
            .collect();

        for path in &expired {
            registry.entries.remove(path);
        }
        expired
    }

    /// Delete expired copies. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let expired = self.take_expired(Instant::now());
        for path in &expired {
            delete_staging_file(path).await;
        }
        expired.len()
    }

    /// Wait until the delay has passed since the last encryption, then delete
    /// every remaining copy.
    pub async fn cleanup_all(&self) -> usize {
        let last_encryption = self.lock().last_encryption;
        if let Some(last) = last_encryption {
            let deadline = last + self.delay;
            if deadline > Instant::now() {
                debug!("waiting {:?} before removing staging files", self.delay);
                tokio::time::sleep_until(deadline.into()).await;
            }
        }

        let remaining: Vec<PathBuf> = self.lock().entries.drain().map(|(path, _)| path).collect();
        for path in &remaining {
            delete_staging_file(path).await;
        }
        remaining.len()
    }
}

async fn delete_staging_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("removed staging file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove staging file {}: {}", path.display(), e),
    }
}
