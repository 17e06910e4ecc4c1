//! Recursive directory walk producing the regular files under a root.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, warn};

use super::ExcludeRules;

/// A regular file found under the local root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Walk `root` and return every regular file not excluded by `rules`.
///
/// Entries are visited in lexicographic order within each directory, so the
/// result is in a stable depth-first order. Symlinks to files are followed;
/// symlinks to directories are not descended into. Entries whose names are
/// not valid UTF-8 cannot become object keys and are skipped with a warning.
pub async fn walk_files(root: &Path, rules: &ExcludeRules) -> io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    walk_directory(root, rules, &mut files).await?;
    Ok(files)
}

async fn walk_directory(
    dir_path: &Path,
    rules: &ExcludeRules,
    files: &mut Vec<LocalFile>,
) -> io::Result<()> {
    let mut entries = fs::read_dir(dir_path).await?;
    let mut sorted_entries = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        sorted_entries.push(entry);
    }
    sorted_entries.sort_by_key(|a| a.file_name());

    for entry in sorted_entries {
        let entry_path = entry.path();
        if entry_path.to_str().is_none() {
            warn!("skipping non-UTF-8 path {}", entry_path.display());
            continue;
        }
        let file_type = entry.file_type().await?;

        if file_type.is_dir() {
            if rules.is_excluded(&entry_path, true) {
                debug!("excluding directory {}", entry_path.display());
                continue;
            }
            Box::pin(walk_directory(&entry_path, rules, files)).await?;
            continue;
        }

        let metadata = if file_type.is_symlink() {
            match fs::metadata(&entry_path).await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!("skipping broken link {}: {}", entry_path.display(), e);
                    continue;
                }
            }
        } else if file_type.is_file() {
            entry.metadata().await?
        } else {
            continue;
        };

        if rules.is_excluded(&entry_path, false) {
            continue;
        }

        files.push(LocalFile {
            path: entry_path,
            modified: metadata.modified()?,
            size: metadata.len(),
        });
    }

    Ok(())
}
