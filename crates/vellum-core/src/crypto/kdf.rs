//! PBKDF2-HMAC-SHA256 key derivation per RFC 8018.
//!
//! Passphrases are stretched into the 32-byte AEAD key with a fixed salt
//! constant. Two iteration modes exist: the legacy fixed count, and a
//! dynamic count derived deterministically from the passphrase bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Legacy fixed PBKDF2 iteration count.
pub const BASE_ITERATIONS: u32 = 100_000;

/// Computes HMAC-SHA-256 of a message using the given key.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    let result = mac.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result.into_bytes());
    output
}

/// Returns the PBKDF2 iteration count for a passphrase.
///
/// In dynamic mode the count is offset by a value derived from the
/// passphrase bytes, so two installations with different passphrases do not
/// share an iteration schedule. The result is a pure function of the inputs.
pub fn iteration_count(passphrase: &str, dynamic: bool) -> u32 {
    if !dynamic {
        return BASE_ITERATIONS;
    }
    let mix: u32 = passphrase.bytes().map(u32::from).sum();
    BASE_ITERATIONS + (mix % 1_000) * 100
}

/// PBKDF2-HMAC-SHA256 with a 32-byte output.
///
/// A 32-byte derived key is exactly one PBKDF2 block, so this is the single
/// block function `F(P, S, c, 1)` from RFC 8018 §5.2.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    debug_assert!(iterations >= 1);

    // U1 = HMAC(P, S || INT(1))
    let mut block = Vec::with_capacity(salt.len() + 4);
    block.extend_from_slice(salt);
    block.extend_from_slice(&1u32.to_be_bytes());

    let mut u = hmac_sha256(password, &block);
    let mut output = u;

    for _ in 1..iterations {
        u = hmac_sha256(password, &u);
        for (acc, byte) in output.iter_mut().zip(u.iter()) {
            *acc ^= byte;
        }
    }

    output
}
