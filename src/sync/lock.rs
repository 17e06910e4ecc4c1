//! Single-instance guard for a sync target.
//!
//! A lock is a marker file created with `create_new` in the state directory.
//! Holding a [`ScopedLock`] means owning that file; dropping the guard
//! removes it. A marker left behind by a crashed run is never cleared
//! automatically: the next run fails with [`SyncError::LockHeld`] naming the
//! file so an operator can remove it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{Result, SyncError};
use super::naming;

/// Diagnostic content of a lock marker.
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    created_at_rfc3339: String,
}

/// Creates per-target lock markers under a state directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    state_dir: PathBuf,
}

impl LockManager {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Path of the marker for `target`.
    pub fn lock_path(&self, target: &str) -> PathBuf {
        naming::lock_file(&self.state_dir, target)
    }

    /// Acquire the lock for `target`.
    ///
    /// With no target the returned guard protects nothing. Never blocks: if
    /// the marker exists this fails at once and leaves the marker untouched.
    pub fn acquire(&self, target: Option<&str>) -> Result<ScopedLock> {
        let Some(target) = target else {
            return Ok(ScopedLock { path: None });
        };

        fs::create_dir_all(&self.state_dir)?;
        let path = self.lock_path(target);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SyncError::LockHeld {
                    target: target.to_string(),
                    holder: describe_holder(&path),
                    path,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let info = LockInfo {
            pid: std::process::id(),
            created_at_rfc3339: Utc::now().to_rfc3339(),
        };
        let written = serde_json::to_vec(&info)
            .map_err(io::Error::other)
            .and_then(|bytes| file.write_all(&bytes));
        if let Err(e) = written {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        debug!("acquired lock {}", path.display());
        Ok(ScopedLock { path: Some(path) })
    }
}

fn describe_holder(path: &Path) -> String {
    match fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<LockInfo>(&contents).ok())
    {
        Some(info) => format!("pid {} since {}", info.pid, info.created_at_rfc3339),
        None => "unknown holder".to_string(),
    }
}

/// Guard owning a lock marker until released or dropped.
#[derive(Debug)]
pub struct ScopedLock {
    path: Option<PathBuf>,
}

impl ScopedLock {
    /// Marker path, or `None` for a guard that protects nothing.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Remove the marker now, reporting failures.
    pub fn release(mut self) -> Result<()> {
        match self.path.take() {
            Some(path) => remove_marker(&path).map_err(SyncError::from),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = remove_marker(&path)
        {
            warn!("failed to remove lock {}: {}", path.display(), e);
        }
    }
}

fn remove_marker(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("released lock {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release_on_drop() {
        let temp = TempDir::new().unwrap();
        let manager = LockManager::new(temp.path());
        let path = manager.lock_path("site");

        {
            let lock = manager.acquire(Some("site")).unwrap();
            assert_eq!(lock.path(), Some(path.as_path()));
            assert!(path.exists());

            let contents = fs::read_to_string(&path).unwrap();
            let info: LockInfo = serde_json::from_str(&contents).unwrap();
            assert_eq!(info.pid, std::process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_held_lock_fails_without_side_effects() {
        let temp = TempDir::new().unwrap();
        let manager = LockManager::new(temp.path());
        let path = manager.lock_path("site");
        fs::write(&path, "left behind").unwrap();

        let result = manager.acquire(Some("site"));
        match result {
            Err(SyncError::LockHeld {
                target,
                path: held,
                holder,
            }) => {
                assert_eq!(target, "site");
                assert_eq!(held, path);
                assert_eq!(holder, "unknown holder");
            }
            other => panic!("expected LockHeld, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "left behind");
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let temp = TempDir::new().unwrap();
        let manager = LockManager::new(temp.path());

        let first = manager.acquire(Some("site")).unwrap();
        let second = manager.acquire(Some("site"));
        assert!(matches!(second, Err(SyncError::LockHeld { .. })));

        // The failed attempt must not have removed the holder's marker.
        assert!(first.path().unwrap().exists());
        first.release().unwrap();
        assert!(manager.acquire(Some("site")).is_ok());
    }

    #[test]
    fn test_targets_lock_independently() {
        let temp = TempDir::new().unwrap();
        let manager = LockManager::new(temp.path());
        let _a = manager.acquire(Some("a")).unwrap();
        assert!(manager.acquire(Some("b")).is_ok());
    }

    #[test]
    fn test_no_target_is_noop() {
        let temp = TempDir::new().unwrap();
        let manager = LockManager::new(temp.path().join("state"));
        let lock = manager.acquire(None).unwrap();
        assert!(lock.path().is_none());
        assert!(!temp.path().join("state").exists());
        lock.release().unwrap();
    }
}
