//! File names used for per-target state, locks, manifests and staging copies.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Characters escaped when a target name or path becomes a single file name.
const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Longest readable tail kept after the hash in a staging name.
const STAGING_TAIL_MAX: usize = 64;

fn file_name_for(value: &str) -> String {
    utf8_percent_encode(value, FILE_NAME).to_string()
}

/// Lock marker for `target`.
pub fn lock_file(state_dir: &Path, target: &str) -> PathBuf {
    state_dir.join(format!("{}.lock", file_name_for(target)))
}

/// Marker written when a run for `target` starts.
pub fn started_marker(state_dir: &Path, target: &str) -> PathBuf {
    state_dir.join(format!("{}.last-sync.started", file_name_for(target)))
}

/// Marker written when a run for `target` finishes cleanly.
pub fn completed_marker(state_dir: &Path, target: &str) -> PathBuf {
    state_dir.join(format!("{}.last-sync.completed", file_name_for(target)))
}

/// Temporary local manifest for `target`.
pub fn local_manifest_file(target: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}.manifest.local", file_name_for(target)))
}

/// Staging directory for `target` under the configured staging root.
pub fn target_staging_dir(staging_root: &Path, target: &str) -> PathBuf {
    staging_root.join(file_name_for(target))
}

/// Staging copy for `source`.
///
/// Named by the SHA-256 of the full source path followed by a bounded,
/// escaped copy of its file name. Every copy lives directly in
/// `staging_dir`, distinct sources never collide, and names stay well
/// under the 255 byte component limit however deep the source is.
pub fn staging_file(staging_dir: &Path, source: &Path) -> PathBuf {
    let digest = hex::encode(Sha256::digest(source.as_os_str().as_encoded_bytes()));
    let tail = source
        .file_name()
        .map(|name| file_name_for(&name.to_string_lossy()))
        .unwrap_or_default();

    // Escaped names are ASCII, so any byte offset is a char boundary.
    let tail = &tail[..tail.len().min(STAGING_TAIL_MAX)];
    if tail.is_empty() {
        staging_dir.join(digest)
    } else {
        staging_dir.join(format!("{}-{}", digest, tail))
    }
}
