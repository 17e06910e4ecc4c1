//! Local side of a sync: walking the directory tree under a target's root.

mod exclude_rules;
mod fs_walker;

pub use exclude_rules::ExcludeRules;
pub use fs_walker::{LocalFile, walk_files};
