//! Mapping between local paths and object keys.

use std::path::{Component, Path, PathBuf};

use super::error::{Result, SyncError};
use crate::encrypt::ENCRYPTED_SUFFIX;

/// Translates between the local root and the remote prefix of a target.
#[derive(Debug, Clone)]
pub struct KeyMapper {
    local_root: PathBuf,
    remote_prefix: Option<String>,
    encrypted: bool,
}

impl KeyMapper {
    /// `remote_prefix` is used without leading or trailing slashes; an empty
    /// prefix maps files to keys relative to the bucket root.
    pub fn new(local_root: impl Into<PathBuf>, remote_prefix: Option<&str>, encrypted: bool) -> Self {
        let remote_prefix = remote_prefix
            .map(|prefix| prefix.trim_matches('/').to_string())
            .filter(|prefix| !prefix.is_empty());
        Self {
            local_root: local_root.into(),
            remote_prefix,
            encrypted,
        }
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Object key for a local file.
    pub fn destination_key(&self, local_path: &Path) -> Result<String> {
        let relative = local_path
            .strip_prefix(&self.local_root)
            .map_err(|_| self.outside_root(local_path))?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy()),
                _ => return Err(self.outside_root(local_path)),
            }
        }
        if parts.is_empty() {
            return Err(self.outside_root(local_path));
        }

        let relative = parts.join("/");
        let mut key = match &self.remote_prefix {
            Some(prefix) => format!("{}/{}", prefix, relative),
            None => relative,
        };
        if self.encrypted {
            key.push_str(ENCRYPTED_SUFFIX);
        }
        Ok(key)
    }

    /// Local path a remote manifest path (`"/" + key`) corresponds to.
    ///
    /// Returns `None` for keys outside the remote prefix.
    pub fn local_path_for(&self, remote_path: &str) -> Option<String> {
        let key = remote_path.strip_prefix('/').unwrap_or(remote_path);
        let relative = match &self.remote_prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('/')?,
            None => key,
        };
        let relative = if self.encrypted {
            relative.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(relative)
        } else {
            relative
        };
        if relative.is_empty() {
            return None;
        }
        Some(self.local_root.join(relative).to_string_lossy().into_owned())
    }

    fn outside_root(&self, path: &Path) -> SyncError {
        SyncError::OutsideRoot {
            path: path.to_path_buf(),
            root: self.local_root.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_without_prefix() {
        let mapper = KeyMapper::new("/var/www", None, false);
        assert_eq!(
            mapper.destination_key(Path::new("/var/www/css/site.css")).unwrap(),
            "css/site.css"
        );
    }

    #[test]
    fn test_key_with_prefix_and_encryption() {
        let mapper = KeyMapper::new("/var/www", Some("/backups/www/"), true);
        assert_eq!(
            mapper.destination_key(Path::new("/var/www/a.txt")).unwrap(),
            "backups/www/a.txt.enc"
        );
    }

    #[test]
    fn test_empty_prefix_is_no_prefix() {
        let mapper = KeyMapper::new("/var/www", Some("/"), false);
        assert_eq!(
            mapper.destination_key(Path::new("/var/www/a.txt")).unwrap(),
            "a.txt"
        );
    }

    #[test]
    fn test_key_outside_root() {
        let mapper = KeyMapper::new("/var/www", None, false);
        assert!(matches!(
            mapper.destination_key(Path::new("/etc/passwd")),
            Err(SyncError::OutsideRoot { .. })
        ));
        assert!(mapper.destination_key(Path::new("/var/www")).is_err());
    }

    #[test]
    fn test_local_path_for_remote() {
        let mapper = KeyMapper::new("/var/www", Some("site"), false);
        assert_eq!(
            mapper.local_path_for("/site/css/a.css"),
            Some("/var/www/css/a.css".to_string())
        );
        assert_eq!(mapper.local_path_for("/other/a.css"), None);
        assert_eq!(mapper.local_path_for("/sitemap.xml"), None);
        assert_eq!(mapper.local_path_for("/site/"), None);
    }

    #[test]
    fn test_local_path_for_encrypted_key() {
        let mapper = KeyMapper::new("/var/www", None, true);
        assert_eq!(
            mapper.local_path_for("/a.txt.enc"),
            Some("/var/www/a.txt".to_string())
        );
    }
}
