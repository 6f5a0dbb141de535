//! Symmetric encryption of piece text and path text.
//!
//! A [`PieceCipher`] derives its key once from a passphrase and then
//! encrypts/decrypts text payloads into a compact envelope:
//!
//! ```text
//! base64(nonce) ":" base64(ciphertext || tag)
//! ```
//!
//! The fixed salt constant is bound both into key derivation and as AEAD
//! associated data, so an envelope only opens under the exact same
//! configuration that produced it.

pub mod aead;
pub mod kdf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

use crate::SALT_OF_PASSPHRASE;

/// AEAD key size in bytes.
pub const KEY_SIZE: usize = 32;
/// AEAD nonce size in bytes.
pub const NONCE_SIZE: usize = 24;
/// AEAD authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Errors from encryption and decryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("encryption failed")]
    EncryptFailed,

    /// Passphrase mismatch, malformed envelope, or corrupt ciphertext
    #[error("decryption failed: passphrase mismatch or corrupt ciphertext")]
    DecryptFailed,
}

/// Passphrase-keyed cipher for piece and path text.
#[derive(Clone)]
pub struct PieceCipher {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for PieceCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug output.
        f.debug_struct("PieceCipher").finish_non_exhaustive()
    }
}

impl PieceCipher {
    /// Derives a cipher from a passphrase.
    ///
    /// `dynamic_iterations` selects the dynamic PBKDF2 iteration schedule;
    /// legacy stores use the fixed count.
    pub fn new(passphrase: &str, dynamic_iterations: bool) -> Self {
        let iterations = kdf::iteration_count(passphrase, dynamic_iterations);
        let key = kdf::pbkdf2_sha256(
            passphrase.as_bytes(),
            SALT_OF_PASSPHRASE.as_bytes(),
            iterations,
        );
        Self { key }
    }

    /// Encrypts text into the envelope form.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = aead::seal(
            &self.key,
            &nonce,
            plaintext.as_bytes(),
            SALT_OF_PASSPHRASE.as_bytes(),
        )?;
        Ok(format!(
            "{}:{}",
            BASE64.encode(nonce),
            BASE64.encode(sealed)
        ))
    }

    /// Decrypts an envelope back into text.
    ///
    /// Every failure mode (bad envelope shape, bad base64, tag mismatch,
    /// non-UTF-8 plaintext) collapses to [`CryptoError::DecryptFailed`]; the
    /// caller aborts the enclosing operation either way.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let (nonce_b64, sealed_b64) =
            envelope.split_once(':').ok_or(CryptoError::DecryptFailed)?;
        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|_| CryptoError::DecryptFailed)?;
        let nonce: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| CryptoError::DecryptFailed)?;
        let sealed = BASE64
            .decode(sealed_b64)
            .map_err(|_| CryptoError::DecryptFailed)?;

        let plaintext = aead::open(&self.key, &nonce, &sealed, SALT_OF_PASSPHRASE.as_bytes())?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptFailed)
    }
}
