//! Choosing which local files need to be pushed.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::error::Result;
use super::key_map::KeyMapper;
use super::manifest::FileRecord;
use crate::local::{ExcludeRules, walk_files};

/// How the transfer set of a run is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStrategy {
    /// Files modified after the start of the last clean run.
    TimeBased { since: DateTime<Utc> },
    /// Files whose path and checksum are not present remotely.
    ChecksumBased,
}

impl DiffStrategy {
    pub fn is_time_based(&self) -> bool {
        matches!(self, DiffStrategy::TimeBased { .. })
    }
}

/// Local records with no identical `(path, checksum)` record remotely.
///
/// Remote-only records are ignored. Output keeps the order of `local`.
pub fn checksum_diff(local: &[FileRecord], remote: &[FileRecord]) -> Vec<FileRecord> {
    let remote: HashSet<&FileRecord> = remote.iter().collect();
    local
        .iter()
        .filter(|record| !remote.contains(record))
        .cloned()
        .collect()
}

/// Rewrite remote records into the local namespace, dropping keys the
/// mapper does not own.
pub fn localize_remote(remote: Vec<FileRecord>, mapper: &KeyMapper) -> Vec<FileRecord> {
    remote
        .into_iter()
        .filter_map(|record| {
            mapper.local_path_for(&record.path).map(|path| FileRecord {
                path,
                checksum: record.checksum,
            })
        })
        .collect()
}

/// Files under `root` modified strictly after `since`, in walk order.
pub async fn modified_since(
    root: &Path,
    rules: &ExcludeRules,
    since: DateTime<Utc>,
) -> Result<Vec<FileRecord>> {
    let files = walk_files(root, rules).await?;
    Ok(files
        .into_iter()
        .filter(|file| DateTime::<Utc>::from(file.modified) > since)
        .map(|file| FileRecord::unchecked(file.path.to_string_lossy().into_owned()))
        .collect())
}
