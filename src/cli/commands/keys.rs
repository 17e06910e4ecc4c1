//! Key generation and decryption commands for encrypted targets.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::cli::Result;
use crate::encrypt::{ENCRYPTED_SUFFIX, KeyPair, open_sealed_file, parse_secret_key};

/// Arguments for the keygen command.
#[derive(Args, Debug)]
pub struct KeygenArgs {}

impl KeygenArgs {
    pub async fn run(self) -> Result<()> {
        let keys = KeyPair::generate();
        println!("public key (encryption_recipient): {}", keys.public_hex());
        println!("secret key (keep private):         {}", keys.secret_hex());
        Ok(())
    }
}

/// Arguments for the decrypt command.
#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Encrypted file, as downloaded from the bucket.
    pub file: PathBuf,

    /// Hex-encoded secret key matching the target's recipient.
    #[arg(long = "secret-key")]
    pub secret_key: String,

    /// Where to write the plaintext; defaults to FILE without its `.enc` suffix.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl DecryptArgs {
    pub async fn run(self) -> Result<()> {
        let secret = parse_secret_key(&self.secret_key)?;
        let output = self
            .output
            .unwrap_or_else(|| default_output_path(&self.file));
        open_sealed_file(&self.file, &output, &secret).await?;
        println!("wrote {}", output.display());
        Ok(())
    }
}

fn default_output_path(file: &Path) -> PathBuf {
    let name = file.to_string_lossy();
    match name.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => PathBuf::from(stripped),
        _ => PathBuf::from(format!("{}.dec", name)),
    }
}
