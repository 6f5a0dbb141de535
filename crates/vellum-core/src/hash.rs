//! Piece hashing.
//!
//! Chunk leaves are content-addressed by `xxhash64` over the piece text, a
//! `-` separator, the passphrase when one is configured, and the piece byte
//! length. The digest is rendered base-36 to keep document ids short.

use xxhash_rust::xxh64::Xxh64;

const SEPARATOR: &[u8] = b"-";

/// Computes the content hash of a piece.
///
/// Without a passphrase: `xxh64(piece ++ "-" ++ len)`.
/// With a passphrase: `xxh64(piece ++ "-" ++ passphrase ++ "-" ++ len)`,
/// so identical pieces under different passphrases land on different ids.
pub fn piece_hash(piece: &str, passphrase: Option<&str>) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.update(piece.as_bytes());
    hasher.update(SEPARATOR);
    if let Some(passphrase) = passphrase {
        hasher.update(passphrase.as_bytes());
        hasher.update(SEPARATOR);
    }
    hasher.update(piece.len().to_string().as_bytes());
    hasher.digest()
}

/// Renders the piece hash in base-36.
pub fn hash36(piece: &str, passphrase: Option<&str>) -> String {
    to_base36(piece_hash(piece, passphrase))
}

/// Formats a `u64` in lowercase base-36.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    // 13 digits cover u64::MAX in base 36.
    let mut buf = [0u8; 13];
    let mut pos = buf.len();
    while value > 0 {
        pos -= 1;
        buf[pos] = DIGITS[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8_lossy(&buf[pos..]).into_owned()
}
