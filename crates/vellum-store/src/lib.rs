//! Vellum Store - The store core.
//!
//! Orchestrates the chunker, crypto, cache, and remote adapter into the
//! note-level operations: `get`, `put`, `delete`, enumeration over all
//! normal documents, and the two change-feed readers.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cache;
pub mod config;
pub mod entry;
pub mod enumerate;
pub mod store;
pub mod watch;

pub use cache::{CacheConfig, ChunkCache};
pub use config::Settings;
pub use entry::{EntryInfo, FileEntry};
pub use enumerate::Enumerator;
pub use store::LiveStore;
pub use watch::{WatchHandle, WatchState};

use thiserror::Error;
use vellum_core::CryptoError;
use vellum_remote::RemoteError;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx response from the remote
    #[error("remote returned HTTP {status}: {body}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        body: String,
    },

    /// Authentication rejected
    #[error("authentication rejected (HTTP {status})")]
    Auth {
        /// HTTP status code
        status: u16,
    },

    /// Metadata revision mismatch
    #[error("revision conflict on metadata update")]
    Conflict,

    /// A per-document rejection inside a bulk write
    #[error("bulk write rejected document {id}: {reason}")]
    Write {
        /// Rejected document id
        id: String,
        /// Server-provided reason
        reason: String,
    },

    /// A metadata entry references data the remote does not hold
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Passphrase mismatch or corrupt ciphertext
    #[error(transparent)]
    Decrypt(#[from] CryptoError),

    /// The operation was cancelled
    #[error("operation aborted")]
    Aborted,

    /// Network-level failure; retryable by the caller
    #[error("transient remote failure: {0}")]
    Transient(String),
}

impl From<RemoteError> for StoreError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Auth { status } => StoreError::Auth { status },
            RemoteError::Conflict => StoreError::Conflict,
            RemoteError::Status { status, body } => StoreError::Remote { status, body },
            RemoteError::Transport(e) => StoreError::Transient(e.to_string()),
            RemoteError::Aborted => StoreError::Aborted,
            RemoteError::Decode(msg) => StoreError::Transient(msg),
            RemoteError::InvalidUrl(url) => StoreError::Config(format!("invalid url: {url}")),
        }
    }
}
