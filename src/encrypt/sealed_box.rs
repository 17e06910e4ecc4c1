//! Anonymous sealed-box encryption to an X25519 public key.
//!
//! Each file is sealed with a fresh ephemeral key pair and XSalsa20-Poly1305,
//! in chunks of [`CHUNK_SIZE`] plaintext bytes so files of any size are
//! processed in bounded memory. The sealed layout is
//! `ephemeral_public_key (32) || nonce_prefix (16) || frame*`, where every
//! frame is one chunk's ciphertext plus its 16 byte tag. A frame's nonce is
//! the prefix, a 7 byte big-endian chunk counter and a final-chunk flag, so
//! reordered, dropped or truncated frames fail to open.

use async_trait::async_trait;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use super::{EncryptError, Encryptor, Result};

/// Plaintext bytes sealed per frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const PREFIX_LEN: usize = 16;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = KEY_LEN + PREFIX_LEN;
const FRAME_LEN: usize = CHUNK_SIZE + TAG_LEN;
const MAX_CHUNKS: u64 = 1 << 56;

/// X25519 key pair; the public half is the encryption recipient.
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Public key as lower-case hex, the form used for `encryption_recipient`.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    /// Secret key as lower-case hex.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }
}

fn decode_key(value: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = hex::decode(value.trim())
        .map_err(|e| EncryptError::InvalidKey(format!("not hex: {}", e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        EncryptError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, bytes.len()))
    })
}

/// Parse a hex-encoded recipient public key.
pub fn parse_public_key(value: &str) -> Result<PublicKey> {
    Ok(PublicKey::from(decode_key(value)?))
}

/// Parse a hex-encoded secret key.
pub fn parse_secret_key(value: &str) -> Result<SecretKey> {
    Ok(SecretKey::from(decode_key(value)?))
}

fn truncated(len: usize) -> EncryptError {
    EncryptError::Decryption(format!(
        "sealed data is {} bytes, shorter than the {} byte header",
        len, HEADER_LEN
    ))
}

/// Per-stream cipher state: the shared box, nonce prefix and chunk counter.
struct ChunkCipher {
    salsa_box: SalsaBox,
    prefix: [u8; PREFIX_LEN],
    index: u64,
}

impl ChunkCipher {
    /// New sealing state for `recipient`, with the header to write first.
    fn for_recipient(recipient: &PublicKey) -> (Self, Vec<u8>) {
        let ephemeral = SecretKey::generate(&mut OsRng);
        let random = SalsaBox::generate_nonce(&mut OsRng);
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&random[..PREFIX_LEN]);

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(ephemeral.public_key().as_bytes());
        header.extend_from_slice(&prefix);

        let cipher = Self {
            salsa_box: SalsaBox::new(recipient, &ephemeral),
            prefix,
            index: 0,
        };
        (cipher, header)
    }

    /// Opening state from a sealed header.
    fn from_header(header: &[u8], secret: &SecretKey) -> Result<Self> {
        if header.len() < HEADER_LEN {
            return Err(truncated(header.len()));
        }
        let mut ephemeral = [0u8; KEY_LEN];
        ephemeral.copy_from_slice(&header[..KEY_LEN]);
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&header[KEY_LEN..HEADER_LEN]);

        Ok(Self {
            salsa_box: SalsaBox::new(&PublicKey::from(ephemeral), secret),
            prefix,
            index: 0,
        })
    }

    fn next_nonce(&mut self, last: bool) -> Option<[u8; NONCE_LEN]> {
        if self.index >= MAX_CHUNKS {
            return None;
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..PREFIX_LEN].copy_from_slice(&self.prefix);
        nonce[PREFIX_LEN..NONCE_LEN - 1].copy_from_slice(&self.index.to_be_bytes()[1..]);
        nonce[NONCE_LEN - 1] = u8::from(last);
        self.index += 1;
        Some(nonce)
    }

    fn seal_chunk(&mut self, chunk: &[u8], last: bool) -> Result<Vec<u8>> {
        let nonce = self
            .next_nonce(last)
            .ok_or_else(|| EncryptError::Encryption("chunk counter exhausted".to_string()))?;
        self.salsa_box
            .encrypt(GenericArray::from_slice(&nonce), chunk)
            .map_err(|e| EncryptError::Encryption(format!("seal failed: {}", e)))
    }

    fn open_chunk(&mut self, frame: &[u8], last: bool) -> Result<Vec<u8>> {
        let index = self.index;
        let nonce = self
            .next_nonce(last)
            .ok_or_else(|| EncryptError::Decryption("chunk counter exhausted".to_string()))?;
        self.salsa_box
            .decrypt(GenericArray::from_slice(&nonce), frame)
            .map_err(|_| {
                EncryptError::Decryption(format!(
                    "chunk {}: wrong key, tampered or truncated data",
                    index
                ))
            })
    }
}

/// Seal `plaintext` for `recipient`.
pub fn seal(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>> {
    let (mut cipher, mut sealed) = ChunkCipher::for_recipient(recipient);
    let chunk_count = plaintext.len().div_ceil(CHUNK_SIZE).max(1);
    sealed.reserve(plaintext.len() + chunk_count * TAG_LEN);

    for index in 0..chunk_count {
        let start = index * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(plaintext.len());
        let frame = cipher.seal_chunk(&plaintext[start..end], index + 1 == chunk_count)?;
        sealed.extend_from_slice(&frame);
    }
    Ok(sealed)
}

/// Open data produced by [`seal`] or [`seal_stream`] with the recipient's
/// secret key.
pub fn open_sealed(sealed: &[u8], secret: &SecretKey) -> Result<Vec<u8>> {
    let mut cipher = ChunkCipher::from_header(sealed, secret)?;
    let body = &sealed[HEADER_LEN..];
    if body.is_empty() {
        return Err(EncryptError::Decryption("sealed data has no frames".to_string()));
    }

    let frames: Vec<&[u8]> = body.chunks(FRAME_LEN).collect();
    let mut plaintext = Vec::with_capacity(body.len());
    for (index, frame) in frames.iter().enumerate() {
        plaintext.extend_from_slice(&cipher.open_chunk(frame, index + 1 == frames.len())?);
    }
    Ok(plaintext)
}

/// Fill `buf` from `reader`, returning fewer bytes only at end of input.
async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Seal everything read from `reader` for `recipient` into `writer`.
///
/// Holds at most two chunks in memory; one chunk of look-ahead decides
/// which frame carries the final-chunk flag.
pub async fn seal_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    recipient: &PublicKey,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut cipher, header) = ChunkCipher::for_recipient(recipient);
    writer.write_all(&header).await?;

    let mut current = vec![0u8; CHUNK_SIZE];
    let mut next = vec![0u8; CHUNK_SIZE];
    let mut len = read_chunk(reader, &mut current).await?;
    loop {
        let next_len = if len == CHUNK_SIZE {
            read_chunk(reader, &mut next).await?
        } else {
            0
        };
        let last = next_len == 0;
        writer
            .write_all(&cipher.seal_chunk(&current[..len], last)?)
            .await?;
        if last {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        len = next_len;
    }
    writer.flush().await?;
    Ok(())
}

/// Open a sealed stream from `reader`, writing the plaintext to `writer`.
pub async fn open_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    secret: &SecretKey,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let header_len = read_chunk(reader, &mut header).await?;
    let mut cipher = ChunkCipher::from_header(&header[..header_len], secret)?;

    let mut current = vec![0u8; FRAME_LEN];
    let mut next = vec![0u8; FRAME_LEN];
    let mut len = read_chunk(reader, &mut current).await?;
    if len == 0 {
        return Err(EncryptError::Decryption("sealed data has no frames".to_string()));
    }
    loop {
        let next_len = if len == FRAME_LEN {
            read_chunk(reader, &mut next).await?
        } else {
            0
        };
        let last = next_len == 0;
        writer
            .write_all(&cipher.open_chunk(&current[..len], last)?)
            .await?;
        if last {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        len = next_len;
    }
    writer.flush().await?;
    Ok(())
}

/// Open the sealed file at `source`, writing the plaintext to `output`.
///
/// A partially written `output` is removed when opening fails.
pub async fn open_sealed_file(source: &Path, output: &Path, secret: &SecretKey) -> Result<()> {
    let mut reader = fs::File::open(source).await?;
    let mut writer = BufWriter::new(fs::File::create(output).await?);

    let result = open_stream(&mut reader, &mut writer, secret).await;
    if result.is_err() {
        drop(writer);
        let _ = fs::remove_file(output).await;
    }
    result
}

/// [`Encryptor`] sealing files chunk by chunk with [`seal_stream`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SealedBoxEncryptor;

impl SealedBoxEncryptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Encryptor for SealedBoxEncryptor {
    async fn encrypt(&self, source: &Path, staging: &Path, recipient: &str) -> Result<()> {
        let recipient = parse_public_key(recipient)?;
        let mut reader = fs::File::open(source).await?;

        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut writer = BufWriter::new(fs::File::create(staging).await?);
        seal_stream(&mut reader, &mut writer, &recipient).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_seal_and_open() {
        let keys = KeyPair::generate();
        let sealed = seal(b"attack at dawn", &keys.public).unwrap();

        assert_eq!(sealed.len(), HEADER_LEN + b"attack at dawn".len() + TAG_LEN);
        assert_eq!(open_sealed(&sealed, &keys.secret).unwrap(), b"attack at dawn");
    }

    #[test]
    fn test_seal_splits_large_input_into_frames() {
        let keys = KeyPair::generate();
        let plaintext = pattern(2 * CHUNK_SIZE + 5);
        let sealed = seal(&plaintext, &keys.public).unwrap();

        assert_eq!(sealed.len(), HEADER_LEN + 2 * FRAME_LEN + 5 + TAG_LEN);
        assert_eq!(open_sealed(&sealed, &keys.secret).unwrap(), plaintext);

        let exact = pattern(2 * CHUNK_SIZE);
        let sealed = seal(&exact, &keys.public).unwrap();
        assert_eq!(sealed.len(), HEADER_LEN + 2 * FRAME_LEN);
        assert_eq!(open_sealed(&sealed, &keys.secret).unwrap(), exact);
    }

    #[test]
    fn test_seal_empty_input() {
        let keys = KeyPair::generate();
        let sealed = seal(b"", &keys.public).unwrap();
        assert_eq!(sealed.len(), HEADER_LEN + TAG_LEN);
        assert!(open_sealed(&sealed, &keys.secret).unwrap().is_empty());
    }

    #[test]
    fn test_dropping_final_frame_is_detected() {
        let keys = KeyPair::generate();
        let sealed = seal(&pattern(2 * CHUNK_SIZE + 5), &keys.public).unwrap();

        let cut = &sealed[..HEADER_LEN + 2 * FRAME_LEN];
        assert!(matches!(
            open_sealed(cut, &keys.secret),
            Err(EncryptError::Decryption(_))
        ));
    }

    #[test]
    fn test_swapped_frames_are_detected() {
        let keys = KeyPair::generate();
        let sealed = seal(&pattern(3 * CHUNK_SIZE), &keys.public).unwrap();

        let mut swapped = sealed[..HEADER_LEN].to_vec();
        swapped.extend_from_slice(&sealed[HEADER_LEN + FRAME_LEN..HEADER_LEN + 2 * FRAME_LEN]);
        swapped.extend_from_slice(&sealed[HEADER_LEN..HEADER_LEN + FRAME_LEN]);
        swapped.extend_from_slice(&sealed[HEADER_LEN + 2 * FRAME_LEN..]);
        assert!(matches!(
            open_sealed(&swapped, &keys.secret),
            Err(EncryptError::Decryption(_))
        ));
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let keys = KeyPair::generate();
        let other = KeyPair::generate();
        let sealed = seal(b"secret", &keys.public).unwrap();

        assert!(matches!(
            open_sealed(&sealed, &other.secret),
            Err(EncryptError::Decryption(_))
        ));
    }

    #[test]
    fn test_open_truncated_data_fails() {
        let keys = KeyPair::generate();
        assert!(matches!(
            open_sealed(&[0u8; 10], &keys.secret),
            Err(EncryptError::Decryption(_))
        ));
        assert!(matches!(
            open_sealed(&[0u8; HEADER_LEN], &keys.secret),
            Err(EncryptError::Decryption(_))
        ));
    }

    #[test]
    fn test_key_hex_round_trip() {
        let keys = KeyPair::generate();
        let public = parse_public_key(&keys.public_hex()).unwrap();
        let secret = parse_secret_key(&keys.secret_hex()).unwrap();
        assert_eq!(public.as_bytes(), keys.public.as_bytes());
        assert_eq!(secret.public_key().as_bytes(), keys.public.as_bytes());
    }

    #[test]
    fn test_parse_invalid_keys() {
        assert!(matches!(
            parse_public_key("zz"),
            Err(EncryptError::InvalidKey(_))
        ));
        assert!(matches!(
            parse_public_key("abcd"),
            Err(EncryptError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_encrypt_file_to_staging() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("plain.txt");
        std::fs::write(&source, b"hello staging").unwrap();
        let staging = temp.path().join("staging/nested/plain.txt.enc");

        let keys = KeyPair::generate();
        SealedBoxEncryptor::new()
            .encrypt(&source, &staging, &keys.public_hex())
            .await
            .unwrap();

        let output = temp.path().join("plain.out");
        open_sealed_file(&staging, &output, &keys.secret)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"hello staging");
    }

    #[tokio::test]
    async fn test_encrypt_multi_chunk_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("large.bin");
        let plaintext = pattern(3 * CHUNK_SIZE + 17);
        std::fs::write(&source, &plaintext).unwrap();
        let staging = temp.path().join("large.bin.enc");

        let keys = KeyPair::generate();
        SealedBoxEncryptor::new()
            .encrypt(&source, &staging, &keys.public_hex())
            .await
            .unwrap();

        let sealed = std::fs::read(&staging).unwrap();
        assert_eq!(sealed.len(), HEADER_LEN + 3 * FRAME_LEN + 17 + TAG_LEN);
        assert_eq!(open_sealed(&sealed, &keys.secret).unwrap(), plaintext);

        let output = temp.path().join("large.out");
        open_sealed_file(&staging, &output, &keys.secret)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), plaintext);
    }

    #[tokio::test]
    async fn test_open_sealed_file_removes_partial_output() {
        let temp = TempDir::new().unwrap();
        let keys = KeyPair::generate();
        let sealed = seal(&pattern(2 * CHUNK_SIZE + 1), &keys.public).unwrap();
        let source = temp.path().join("cut.enc");
        std::fs::write(&source, &sealed[..HEADER_LEN + 2 * FRAME_LEN]).unwrap();

        let output = temp.path().join("cut.out");
        let result = open_sealed_file(&source, &output, &keys.secret).await;
        assert!(matches!(result, Err(EncryptError::Decryption(_))));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_encrypt_rejects_bad_recipient() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("plain.txt");
        std::fs::write(&source, b"x").unwrap();

        let result = SealedBoxEncryptor::new()
            .encrypt(&source, &temp.path().join("out.enc"), "not-a-key")
            .await;
        assert!(matches!(result, Err(EncryptError::InvalidKey(_))));
        assert!(!temp.path().join("out.enc").exists());
    }
}
