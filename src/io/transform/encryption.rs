//! Payload encryption.
//!
//! # Security Properties
//!
//! - **Algorithm**: AES-256-GCM (authenticated encryption)
//! - **Key**: PBKDF2-HMAC-SHA256 over the caller's secret, 100 000 iterations,
//!   fresh 16-byte salt per payload
//! - **Nonce**: 12 bytes, randomly generated per payload
//! - **Format**: `PROMPTPORT_ENC_V1\0` magic + salt + nonce + ciphertext + auth tag
//!
//! Encryption is gated by the `encryption` feature; without it every
//! operation returns [`crate::Error::FeatureNotEnabled`].

/// Magic bytes identifying an encrypted payload.
pub const MAGIC_HEADER: &[u8] = b"PROMPTPORT_ENC_V1\0";

/// Salt size for key derivation.
pub const SALT_SIZE: usize = 16;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
pub const NONCE_SIZE: usize = 12;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Algorithm label recorded in export results.
pub const ALGORITHM: &str = "aes-256-gcm";

/// Key derivation label recorded in export results.
pub const KEY_DERIVATION: &str = "pbkdf2-hmac-sha256";

/// Checks if data appears to be encrypted (has magic header).
#[must_use]
pub fn is_encrypted(data: &[u8]) -> bool {
    data.starts_with(MAGIC_HEADER)
}

#[cfg(feature = "encryption")]
mod implementation {
    use super::{MAGIC_HEADER, NONCE_SIZE, PBKDF2_ITERATIONS, SALT_SIZE, is_encrypted};
    use crate::{Error, Result};

    use aes_gcm::{
        Aes256Gcm, Key, Nonce,
        aead::{Aead, KeyInit},
    };
    use rand::Rng;
    use secrecy::{ExposeSecret, SecretString};
    use sha2::Sha256;

    /// Key size for AES-256 (32 bytes / 256 bits).
    const KEY_SIZE: usize = 32;

    /// AES-256-GCM cipher keyed from a passphrase.
    pub struct PayloadCipher {
        secret: SecretString,
    }

    impl PayloadCipher {
        /// Creates a cipher for `secret`.
        ///
        /// # Errors
        ///
        /// Returns an error if the secret is empty.
        pub fn new(secret: SecretString) -> Result<Self> {
            if secret.expose_secret().is_empty() {
                return Err(Error::InvalidInput("Encryption secret is empty".to_string()));
            }
            Ok(Self { secret })
        }

        fn cipher(&self, salt: &[u8]) -> Aes256Gcm {
            let mut key = [0u8; KEY_SIZE];
            pbkdf2::pbkdf2_hmac::<Sha256>(
                self.secret.expose_secret().as_bytes(),
                salt,
                PBKDF2_ITERATIONS,
                &mut key,
            );
            Aes256Gcm::new(&Key::<Aes256Gcm>::from(key))
        }

        /// Encrypts plaintext data.
        ///
        /// Returns: magic header + salt + nonce + ciphertext (includes auth tag)
        ///
        /// # Errors
        ///
        /// Returns an error if encryption fails.
        pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
            let mut salt = [0u8; SALT_SIZE];
            let mut nonce_bytes = [0u8; NONCE_SIZE];
            let mut rng = rand::rng();
            rng.fill_bytes(&mut salt);
            rng.fill_bytes(&mut nonce_bytes);

            let ciphertext = self
                .cipher(&salt)
                .encrypt(&Nonce::from(nonce_bytes), plaintext)
                .map_err(|e| Error::OperationFailed {
                    operation: "encrypt".to_string(),
                    cause: format!("AES-256-GCM encryption failed: {e}"),
                })?;

            let mut output =
                Vec::with_capacity(MAGIC_HEADER.len() + SALT_SIZE + NONCE_SIZE + ciphertext.len());
            output.extend_from_slice(MAGIC_HEADER);
            output.extend_from_slice(&salt);
            output.extend_from_slice(&nonce_bytes);
            output.extend_from_slice(&ciphertext);

            tracing::debug!(
                plaintext_len = plaintext.len(),
                encrypted_len = output.len(),
                "Encrypted payload"
            );
            Ok(output)
        }

        /// Decrypts an encrypted payload.
        ///
        /// # Errors
        ///
        /// Returns an error if the data is malformed, the secret is wrong, or
        /// the ciphertext was tampered with.
        pub fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
            let min_size = MAGIC_HEADER.len() + SALT_SIZE + NONCE_SIZE + 16; // 16 = auth tag
            if encrypted.len() < min_size {
                return Err(Error::InvalidInput(format!(
                    "Encrypted data too short: {} bytes, minimum {min_size}",
                    encrypted.len()
                )));
            }
            if !is_encrypted(encrypted) {
                return Err(Error::InvalidInput(
                    "Invalid encrypted payload: missing magic header".to_string(),
                ));
            }

            let salt_start = MAGIC_HEADER.len();
            let nonce_start = salt_start + SALT_SIZE;
            let nonce_end = nonce_start + NONCE_SIZE;
            let nonce_array: [u8; NONCE_SIZE] = encrypted[nonce_start..nonce_end]
                .try_into()
                .map_err(|_| Error::InvalidInput("Invalid nonce length".to_string()))?;

            let plaintext = self
                .cipher(&encrypted[salt_start..nonce_start])
                .decrypt(&Nonce::from(nonce_array), &encrypted[nonce_end..])
                .map_err(|e| Error::OperationFailed {
                    operation: "decrypt".to_string(),
                    cause: format!("AES-256-GCM decryption failed (wrong secret or corrupted data): {e}"),
                })?;

            tracing::debug!(
                encrypted_len = encrypted.len(),
                plaintext_len = plaintext.len(),
                "Decrypted payload"
            );
            Ok(plaintext)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn cipher(secret: &str) -> PayloadCipher {
            PayloadCipher::new(SecretString::from(secret.to_string())).unwrap()
        }

        #[test]
        fn test_encrypt_decrypt_roundtrip() {
            let c = cipher("correct horse battery staple");
            let plaintext = b"{\"prompts\":[]}";

            let encrypted = c.encrypt(plaintext).unwrap();
            assert!(is_encrypted(&encrypted));
            assert_eq!(c.decrypt(&encrypted).unwrap(), plaintext);
        }

        #[test]
        fn test_fresh_salt_and_nonce_per_payload() {
            let c = cipher("secret");
            assert_ne!(c.encrypt(b"same").unwrap(), c.encrypt(b"same").unwrap());
        }

        #[test]
        fn test_wrong_secret_and_tampering_fail() {
            let encrypted = cipher("right").encrypt(b"payload").unwrap();
            assert!(cipher("wrong").decrypt(&encrypted).is_err());

            let mut tampered = encrypted;
            let last = tampered.len() - 1;
            tampered[last] ^= 0xff;
            assert!(cipher("right").decrypt(&tampered).is_err());
        }

        #[test]
        fn test_rejects_short_and_unmarked_data() {
            let c = cipher("secret");
            assert!(c.decrypt(b"too short").is_err());
            assert!(c.decrypt(&[0u8; 100]).is_err());
            assert!(PayloadCipher::new(SecretString::from(String::new())).is_err());
        }
    }
}

#[cfg(feature = "encryption")]
pub use implementation::PayloadCipher;

#[cfg(not(feature = "encryption"))]
mod stub {
    use crate::{Error, Result};
    use secrecy::SecretString;

    /// Payload cipher (stub).
    pub struct PayloadCipher;

    impl PayloadCipher {
        /// Returns an error indicating encryption is not available.
        ///
        /// # Errors
        ///
        /// Always returns an error.
        pub fn new(_secret: SecretString) -> Result<Self> {
            Err(Error::FeatureNotEnabled("encryption".to_string()))
        }

        /// Returns an error indicating encryption is not available.
        ///
        /// # Errors
        ///
        /// Always returns an error.
        pub fn encrypt(&self, _plaintext: &[u8]) -> Result<Vec<u8>> {
            Err(Error::FeatureNotEnabled("encryption".to_string()))
        }

        /// Returns an error indicating encryption is not available.
        ///
        /// # Errors
        ///
        /// Always returns an error.
        pub fn decrypt(&self, _encrypted: &[u8]) -> Result<Vec<u8>> {
            Err(Error::FeatureNotEnabled("encryption".to_string()))
        }
    }
}

#[cfg(not(feature = "encryption"))]
pub use stub::PayloadCipher;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_encrypted() {
        assert!(is_encrypted(MAGIC_HEADER));
        assert!(is_encrypted(b"PROMPTPORT_ENC_V1\0rest"));
        assert!(!is_encrypted(b"{}"));
        assert!(!is_encrypted(b""));
    }
}
