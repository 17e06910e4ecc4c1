//! Gitignore-style exclusion rules for a sync root.
//!
//! Patterns come from the target's `exclude` setting and are interpreted
//! relative to the local root, exactly as lines of a `.gitignore` placed there.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Compiled exclusion rules for one local root.
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    matcher: Option<Gitignore>,
}

impl ExcludeRules {
    /// Rules that exclude nothing.
    pub fn none() -> Self {
        Self { matcher: None }
    }

    /// Compile `patterns` relative to `root`.
    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Self, ignore::Error> {
        if patterns.is_empty() {
            return Ok(Self::none());
        }

        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder.add_line(None, pattern.as_ref())?;
        }
        Ok(Self {
            matcher: Some(builder.build()?),
        })
    }

    /// Whether `path` (absolute, under the root) is excluded.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.matched(path, is_dir).is_ignore(),
            None => false,
        }
    }
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_patterns_excludes_nothing() {
        let rules = ExcludeRules::new::<&str>(Path::new("/srv"), &[]).unwrap();
        assert!(!rules.is_excluded(Path::new("/srv/a.txt"), false));
    }

    #[test]
    fn test_patterns_relative_to_root() {
        let rules = ExcludeRules::new(Path::new("/srv"), &["*.log", ".git/", "/cache"]).unwrap();

        assert!(rules.is_excluded(Path::new("/srv/app.log"), false));
        assert!(rules.is_excluded(Path::new("/srv/sub/debug.log"), false));
        assert!(rules.is_excluded(Path::new("/srv/.git"), true));
        assert!(!rules.is_excluded(Path::new("/srv/.git"), false));
        assert!(rules.is_excluded(Path::new("/srv/cache"), true));
        assert!(!rules.is_excluded(Path::new("/srv/sub/cache"), true));
        assert!(!rules.is_excluded(Path::new("/srv/index.html"), false));
    }

    #[test]
    fn test_negated_pattern() {
        let rules = ExcludeRules::new(Path::new("/srv"), &["*.log", "!keep.log"]).unwrap();
        assert!(rules.is_excluded(Path::new("/srv/drop.log"), false));
        assert!(!rules.is_excluded(Path::new("/srv/keep.log"), false));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ExcludeRules::new(Path::new("/srv"), &["[z-a]"]).is_err());
    }
}
