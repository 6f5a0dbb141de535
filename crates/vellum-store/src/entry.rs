//! Loaded note entries.

use vellum_core::{DocumentId, FilePath, NoteKind};

/// Timestamps and size a caller supplies with a write.
#[derive(Debug, Clone, Copy)]
pub struct EntryInfo {
    /// Creation time, unix milliseconds
    pub ctime: i64,
    /// Modification time, unix milliseconds
    pub mtime: i64,
    /// Logical size in bytes
    pub size: u64,
}

/// A note as returned by the store: metadata plus, unless a meta-only read
/// was requested, the reassembled content.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Remote document id
    pub id: DocumentId,
    /// Current revision
    pub rev: Option<String>,
    /// Logical path (decrypted when obfuscation is enabled)
    pub path: FilePath,
    /// Metadata flavor
    pub kind: NoteKind,
    /// Reassembled content; empty for meta-only reads and tombstones
    pub data: String,
    /// Ordered chunk references
    pub children: Vec<DocumentId>,
    /// Creation time, unix milliseconds
    pub ctime: i64,
    /// Modification time, unix milliseconds
    pub mtime: i64,
    /// Logical size in bytes
    pub size: u64,
    /// Tombstone marker
    pub deleted: bool,
}
