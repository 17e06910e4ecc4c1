//! Per-target run markers deciding whether the fast time-based diff is safe.
//!
//! `started` is written at the start of every run. `completed` is written only
//! when a run finishes, as a copy of `started`, so it always records the start
//! time of the last clean run. Files touched while that run was in flight are
//! therefore newer than the cutoff and get picked up again next time.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs;
use tracing::{debug, warn};

use super::error::{Result, SyncError};
use super::naming;

/// Reads and writes the `started` / `completed` markers of one target.
#[derive(Debug)]
pub struct SyncStateTracker {
    state_dir: PathBuf,
    started: PathBuf,
    completed: PathBuf,
    begun_at: Option<DateTime<Utc>>,
}

impl SyncStateTracker {
    pub fn new(state_dir: impl Into<PathBuf>, target: &str) -> Self {
        let state_dir = state_dir.into();
        Self {
            started: naming::started_marker(&state_dir, target),
            completed: naming::completed_marker(&state_dir, target),
            state_dir,
            begun_at: None,
        }
    }

    pub fn started_path(&self) -> &Path {
        &self.started
    }

    pub fn completed_path(&self) -> &Path {
        &self.completed
    }

    /// Start time of the last clean run, if one is recorded.
    ///
    /// A `completed` marker that cannot be parsed counts as absent.
    pub async fn completed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let contents = match fs::read_to_string(&self.completed).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match DateTime::parse_from_rfc3339(contents.trim()) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                warn!(
                    "ignoring unreadable sync marker {}: {}",
                    self.completed.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Whether a previous run finished cleanly.
    pub async fn has_completed_prior_sync(&self) -> Result<bool> {
        Ok(self.completed_at().await?.is_some())
    }

    /// Record the start of a run, overwriting any previous `started` marker.
    pub async fn begin_run(&mut self) -> Result<DateTime<Utc>> {
        fs::create_dir_all(&self.state_dir).await?;
        let now = Utc::now();
        fs::write(
            &self.started,
            now.to_rfc3339_opts(SecondsFormat::Nanos, true),
        )
        .await?;
        debug!("wrote {}", self.started.display());
        self.begun_at = Some(now);
        Ok(now)
    }

    /// Record that the run begun with [`begin_run`](Self::begin_run) finished.
    pub async fn complete_run(&self) -> Result<()> {
        if self.begun_at.is_none() {
            return Err(SyncError::NotStarted);
        }

        let mut temp_name = self.completed.clone().into_os_string();
        temp_name.push(".tmp");
        let temp = PathBuf::from(temp_name);

        fs::copy(&self.started, &temp).await?;
        fs::rename(&temp, &self.completed).await?;
        debug!("wrote {}", self.completed.display());
        Ok(())
    }

    /// Forget every previous run.
    pub async fn clear_state(&self) -> Result<()> {
        for marker in [&self.started, &self.completed] {
            match fs::remove_file(marker).await {
                Ok(()) => debug!("removed {}", marker.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
