//! XChaCha20-Poly1305 authenticated encryption.
//!
//! The low-level seal/open pair beneath [`crate::crypto::PieceCipher`].
//! Nonces are caller-supplied; the envelope layer stores them alongside the
//! ciphertext.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use super::{CryptoError, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Encrypts plaintext, returning ciphertext with the 16-byte tag appended.
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::EncryptFailed)?;
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    cipher
        .encrypt(XNonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::EncryptFailed)
}

/// Decrypts a ciphertext-with-tag produced by [`seal`].
///
/// Any authentication failure (wrong key, wrong aad, tampered bytes) maps to
/// [`CryptoError::DecryptFailed`].
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext_with_tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext_with_tag.len() < TAG_SIZE {
        return Err(CryptoError::DecryptFailed);
    }
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
    let payload = Payload {
        msg: ciphertext_with_tag,
        aad,
    };
    cipher
        .decrypt(XNonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::DecryptFailed)
}
