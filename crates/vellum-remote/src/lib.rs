//! Vellum Remote - Typed HTTP access to a CouchDB-compatible server.
//!
//! Wraps the handful of endpoints the store needs: single-document get/put,
//! keyed and ranged `_all_docs`, `_bulk_docs`, and the `_changes` feed in
//! both paged and continuous modes. Every request carries HTTP Basic
//! authentication and a JSON content type.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod changes;
pub mod client;
pub mod framing;

pub use changes::{ChangeRow, ChangesPage, ContinuousChanges};
pub use client::{AllDocsRow, BulkDocResult, CouchClient, DbInfo, PutResult, RemoteConfig};
pub use framing::LineFramer;

use thiserror::Error;

/// Errors from remote operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// 401/403 from the server
    #[error("authentication rejected with HTTP {status}")]
    Auth {
        /// HTTP status code
        status: u16,
    },

    /// Revision mismatch on a document write
    #[error("document update conflict")]
    Conflict,

    /// Any other non-2xx response
    #[error("remote returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        body: String,
    },

    /// Connection failures, timeouts, closed streams
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The operation was cancelled through its abort handle
    #[error("request aborted")]
    Aborted,

    /// Response body did not decode as expected
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Endpoint URL could not be constructed
    #[error("invalid remote url: {0}")]
    InvalidUrl(String),
}
