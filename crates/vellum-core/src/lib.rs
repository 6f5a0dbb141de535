//! Vellum Core - Core types and primitives for the Vellum note store.
//!
//! This crate provides:
//! - Identifier types (`DocumentId`, `FilePath`) and their derivation rules
//! - Piece hashing (xxhash64, base-36 rendered)
//! - Passphrase-based symmetric encryption for chunk payloads and paths
//! - The wire document model shared with the remote database

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod docs;
pub mod hash;
pub mod ids;
pub mod time;

pub use crypto::{CryptoError, PieceCipher};
pub use docs::{EntryDoc, LeafDoc, NoteDoc, NoteKind};
pub use ids::{DocumentId, FilePath};

/// Salt constant bound into key derivation and the AEAD envelope.
pub const SALT_OF_PASSPHRASE: &str = "rHGMPtr6oWw7VSa3W3wpa8fT8U";

/// Id prefix for chunk leaf documents.
pub const PREFIX_CHUNK: &str = "h:";

/// Id prefix for chunk leaf documents holding an encrypted payload.
pub const PREFIX_ENCRYPTED_CHUNK: &str = "h:+";

/// Id prefix for obfuscated (path-encrypted) metadata documents.
pub const PREFIX_OBFUSCATED: &str = "f:";

/// Database format version token.
pub const VER: u32 = 10;

/// Target piece size in bytes where delimiter splitting applies.
pub const MAX_DOC_SIZE: usize = 1_000;

/// Ceiling for a single piece payload in bytes.
pub const MAX_DOC_SIZE_BIN: usize = 102_400;

/// Well-known document ids the store must never produce or overwrite.
pub const RESERVED_IDS: [&str; 4] = [
    "obsydian_livesync_version",
    "_local/obsydian_livesync_milestone",
    "_local/obsydian_livesync_nodeinfo",
    "syncinfo",
];
