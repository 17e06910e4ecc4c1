//! Manifest records and the on-disk manifest line format.
//!
//! A manifest file holds one line per file in the form
//! `ALGO(absolute-path)= hex-digest`. Paths are not escaped.

use std::io;
use std::path::Path;

use tokio::fs;

use super::error::{Result, SyncError};

const PATH_END: &str = ")= ";

/// One file on one side of a sync.
///
/// Records compare equal only when both path and checksum match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRecord {
    pub path: String,
    /// Hex digest; `None` for records produced by the time-based diff.
    pub checksum: Option<String>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: Some(checksum.into()),
        }
    }

    /// A record identified by path alone.
    pub fn unchecked(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: None,
        }
    }
}

/// Format one manifest line, without the trailing newline.
pub fn format_line(algorithm: &str, path: &str, digest: &str) -> String {
    format!("{}({}{}{}", algorithm, path, PATH_END, digest)
}

/// Parse one manifest line.
///
/// The path runs to the last `)= `, so a path containing that sequence still
/// parses as long as the digest does not.
pub fn parse_line(line: &str) -> Option<FileRecord> {
    let (algorithm, rest) = line.split_once('(')?;
    if algorithm.is_empty() || !algorithm.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let split = rest.rfind(PATH_END)?;
    let path = &rest[..split];
    let digest = &rest[split + PATH_END.len()..];

    if path.is_empty() || digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(FileRecord::new(path, digest.to_ascii_lowercase()))
}

/// Read a manifest file.
///
/// A missing file is an empty manifest. Blank lines are skipped; any other
/// line that does not parse is an error carrying its 1-based line number.
pub async fn parse_manifest(path: &Path) -> Result<Vec<FileRecord>> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(record) => records.push(record),
            None => {
                return Err(SyncError::Manifest {
                    path: path.to_path_buf(),
                    line: index + 1,
                    content: line.to_string(),
                });
            }
        }
    }
    Ok(records)
}

/// Write `(path, digest)` entries as a manifest file, replacing any old one.
pub async fn write_manifest(
    path: &Path,
    algorithm: &str,
    entries: &[(String, String)],
) -> Result<()> {
    let mut contents = String::new();
    for (file, digest) in entries {
        contents.push_str(&format_line(algorithm, file, digest));
        contents.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, contents).await?;
    Ok(())
}
