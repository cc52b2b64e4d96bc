//! Byte-level payload transforms.
//!
//! Export applies these in order (compress, then encrypt, then checksum over
//! the final bytes); import undoes them by sniffing magic bytes.

pub mod compression;
pub mod encryption;
pub mod memory;

pub use compression::{Compression, DEFAULT_COMPRESSION_LEVEL, gunzip, gzip, gzip_writer, is_gzip};
pub use encryption::{PayloadCipher, is_encrypted};
pub use memory::MemoryReclaimer;

use crate::{Error, Result};
use secrecy::SecretString;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;

/// Export encryption settings.
#[derive(Debug, Clone)]
pub struct EncryptionOptions {
    /// Algorithm label; only `aes-256-gcm` is supported.
    pub algorithm: String,
    /// Passphrase the key is derived from.
    pub secret: SecretString,
}

impl EncryptionOptions {
    /// AES-256-GCM with a key derived from `secret`.
    #[must_use]
    pub fn aes_256_gcm(secret: SecretString) -> Self {
        Self {
            algorithm: encryption::ALGORITHM.to_string(),
            secret,
        }
    }
}

/// Encryption parameters reported on an encrypted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    /// Cipher.
    pub algorithm: String,
    /// Key derivation function.
    pub key_derivation: String,
    /// KDF iteration count.
    pub iterations: u32,
}

/// Encrypts `data` per `options`.
///
/// # Errors
///
/// Returns an error for unsupported algorithms, when the `encryption` feature
/// is disabled, or if encryption fails.
pub fn encrypt(data: &[u8], options: &EncryptionOptions) -> Result<(Vec<u8>, EncryptionInfo)> {
    if !options.algorithm.eq_ignore_ascii_case(encryption::ALGORITHM) {
        return Err(Error::InvalidInput(format!(
            "Unsupported encryption algorithm: {}",
            options.algorithm
        )));
    }
    let encrypted = PayloadCipher::new(options.secret.clone())?.encrypt(data)?;
    Ok((
        encrypted,
        EncryptionInfo {
            algorithm: encryption::ALGORITHM.to_string(),
            key_derivation: encryption::KEY_DERIVATION.to_string(),
            iterations: encryption::PBKDF2_ITERATIONS,
        },
    ))
}

/// Undoes export transforms: decrypts when the payload is encrypted, then
/// decompresses when it is gzip.
///
/// # Errors
///
/// Returns an error if the payload is encrypted and no secret is given, or
/// if decryption or decompression fails.
pub fn decode_payload(data: &[u8], secret: Option<&SecretString>) -> Result<Vec<u8>> {
    let decrypted = if is_encrypted(data) {
        let secret = secret.ok_or_else(|| {
            Error::InvalidInput("Payload is encrypted but no decryption secret was given".to_string())
        })?;
        PayloadCipher::new(secret.clone())?.decrypt(data)?
    } else {
        data.to_vec()
    };

    if is_gzip(&decrypted) {
        gunzip(&decrypted)
    } else {
        Ok(decrypted)
    }
}

/// SHA-256 of `data` as 64 lowercase hex characters.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Writer that hashes and counts everything passing through it.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Returns the inner writer, the hex digest and the byte count.
    pub fn finish(self) -> (W, String, u64) {
        (self.inner, hex::encode(self.hasher.finalize()), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hashing_writer_matches_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.written(), 11);

        let (bytes, digest, count) = writer.finish();
        assert_eq!(bytes, b"hello world");
        assert_eq!(digest, sha256_hex(b"hello world"));
        assert_eq!(count, 11);
    }

    #[test]
    fn test_decode_payload_passthrough_and_gzip() {
        assert_eq!(decode_payload(b"plain", None).unwrap(), b"plain");
        let compressed = gzip(b"packed", 6).unwrap();
        assert_eq!(decode_payload(&compressed, None).unwrap(), b"packed");
    }

    #[test]
    fn test_decode_encrypted_without_secret_fails() {
        let mut fake = encryption::MAGIC_HEADER.to_vec();
        fake.extend_from_slice(&[0u8; 64]);
        assert!(decode_payload(&fake, None).is_err());
    }

    #[test]
    fn test_unsupported_algorithm() {
        let options = EncryptionOptions {
            algorithm: "rot13".to_string(),
            secret: SecretString::from("s".to_string()),
        };
        assert!(encrypt(b"x", &options).is_err());
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn test_encrypted_gzip_decodes() {
        let secret = SecretString::from("pass".to_string());
        let compressed = gzip(b"{\"prompts\":[]}", 6).unwrap();
        let (encrypted, info) = encrypt(&compressed, &EncryptionOptions::aes_256_gcm(secret.clone())).unwrap();
        assert_eq!(info.iterations, 100_000);
        assert_eq!(decode_payload(&encrypted, Some(&secret)).unwrap(), b"{\"prompts\":[]}");
    }
}
