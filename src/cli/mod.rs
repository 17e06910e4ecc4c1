//! Command-line interface for ssync.

pub mod args;
mod commands;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub use args::GlobalArgs;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during CLI execution.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("{0}")]
    Config(#[from] crate::config::ConfigError),

    /// Sync error.
    #[error("{0}")]
    Sync(#[from] crate::sync::SyncError),

    /// Encryption error.
    #[error("{0}")]
    Encrypt(#[from] crate::encrypt::EncryptError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

// =============================================================================
// CLI Definition
// =============================================================================

/// ssync - Incrementally mirror local directories into S3 buckets.
#[derive(Parser, Debug)]
#[command(name = "ssync", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Push new and changed files of a target to its bucket.
    Sync(commands::sync::SyncArgs),

    /// Generate a key pair for encrypted targets.
    Keygen(commands::keys::KeygenArgs),

    /// Decrypt a downloaded encrypted object.
    Decrypt(commands::keys::DecryptArgs),
}

// =============================================================================
// CLI Execution
// =============================================================================

impl Cli {
    /// Parse command-line arguments and return the CLI instance.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Sync(args) => args.run(&self.global).await,
            Command::Keygen(args) => args.run().await,
            Command::Decrypt(args) => args.run().await,
        }
    }
}

/// Install the log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "ssync_rs=debug"
    } else {
        "ssync_rs=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main entry point for the CLI.
pub async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.global.verbose);
    cli.run().await
}
