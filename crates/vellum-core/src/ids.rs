//! Identifier types.
//!
//! `FilePath` is the logical path a caller addresses a note by; `DocumentId`
//! is the remote document key it maps to. They are bijective under a given
//! obfuscation configuration but deliberately distinct types so one cannot be
//! passed where the other is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::hash36;
use crate::{PREFIX_CHUNK, PREFIX_ENCRYPTED_CHUNK, PREFIX_OBFUSCATED, RESERVED_IDS};

/// Remote document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wraps an already-derived identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the leaf id for a piece of content.
    ///
    /// Encrypted stores carry a `+` marker after the chunk prefix so readers
    /// know to decrypt the payload.
    pub fn leaf(piece: &str, passphrase: Option<&str>) -> Self {
        let digest = hash36(piece, passphrase);
        match passphrase {
            Some(_) => Self(format!("{PREFIX_ENCRYPTED_CHUNK}{digest}")),
            None => Self(format!("{PREFIX_CHUNK}{digest}")),
        }
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for chunk leaf ids (`h:` prefix).
    pub fn is_chunk(&self) -> bool {
        self.0.starts_with(PREFIX_CHUNK)
    }

    /// Returns true for chunk leaf ids holding an encrypted payload (`h:+`).
    pub fn is_encrypted_chunk(&self) -> bool {
        self.0.starts_with(PREFIX_ENCRYPTED_CHUNK)
    }

    /// Returns true for obfuscated metadata ids (`f:` prefix).
    pub fn is_obfuscated(&self) -> bool {
        self.0.starts_with(PREFIX_OBFUSCATED)
    }

    /// Returns true if the id is one of the well-known system documents.
    pub fn is_reserved(&self) -> bool {
        RESERVED_IDS.contains(&self.0.as_str())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Logical file path of a note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath(String);

impl FilePath {
    /// Wraps a path string.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lowercase extension, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext)
    }

    /// Derives the remote document id for this path.
    ///
    /// With an obfuscation passphrase the id is `f:` plus the salted piece
    /// hash of the path, so the id leaks nothing about the name. Otherwise
    /// the id is the canonicalized path itself: a leading `/` is stripped,
    /// and a path that would begin with `_` is prefixed with `/` to keep it
    /// out of the database's reserved id space.
    pub fn to_document_id(&self, obfuscate_passphrase: Option<&str>) -> DocumentId {
        if let Some(passphrase) = obfuscate_passphrase {
            let digest = hash36(&self.0, Some(passphrase));
            return DocumentId::new(format!("{PREFIX_OBFUSCATED}{digest}"));
        }
        let trimmed = self.0.trim_start_matches('/');
        if trimmed.starts_with('_') {
            DocumentId::new(format!("/{trimmed}"))
        } else {
            DocumentId::new(trimmed)
        }
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FilePath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}
