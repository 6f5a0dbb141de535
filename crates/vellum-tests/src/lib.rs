//! Test harness for end-to-end store testing.
//!
//! Provides [`CouchSim`], a small stateful CouchDB stand-in mounted on a
//! wiremock server: enough of the document, `_all_docs`, `_bulk_docs`, and
//! `_changes` semantics for the store to run complete write/read/feed cycles
//! against it.

#![deny(unsafe_code)]

pub mod sim;

pub use sim::CouchSim;
