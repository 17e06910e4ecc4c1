//! Subcommand implementations.

pub mod keys;
pub mod sync;
