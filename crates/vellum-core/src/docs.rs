//! Wire document model.
//!
//! Every document shares one JSON envelope and is discriminated by its
//! `type` field: chunk leaves carry payload text, metadata entries describe a
//! note by path, timestamps, and an ordered list of chunk ids. Anything else
//! on the wire (version markers, sync state) is not a note and is ignored by
//! the store core.

use serde::{Deserialize, Serialize};

use crate::ids::DocumentId;

/// Metadata entry flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    /// Plain text note
    Plain,
    /// New-style note
    NewNote,
}

/// A chunk leaf document.
///
/// `data` is the piece text verbatim, or its encryption envelope when the
/// id carries the encrypted-chunk marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafDoc {
    /// Document id (`h:` or `h:+` prefixed)
    #[serde(rename = "_id")]
    pub id: DocumentId,
    /// Revision, present once stored
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Piece payload
    pub data: String,
}

/// A metadata entry describing one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDoc {
    /// Document id
    #[serde(rename = "_id")]
    pub id: DocumentId,
    /// Revision, present once stored
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// File path; ciphertext when path obfuscation is enabled
    pub path: String,
    /// Ordered chunk references; reconstitution concatenates them in order
    pub children: Vec<DocumentId>,
    /// Creation time, unix milliseconds
    pub ctime: i64,
    /// Modification time, unix milliseconds
    pub mtime: i64,
    /// Logical size in bytes
    pub size: u64,
    /// Tombstone marker
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The tagged union of documents the store produces and consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntryDoc {
    /// Chunk leaf
    #[serde(rename = "leaf")]
    Leaf(LeafDoc),
    /// Plain metadata entry
    #[serde(rename = "plain")]
    Plain(NoteDoc),
    /// New-style metadata entry
    #[serde(rename = "newnote")]
    NewNote(NoteDoc),
}

impl EntryDoc {
    /// Wraps a note in the envelope matching its kind.
    pub fn note(kind: NoteKind, doc: NoteDoc) -> Self {
        match kind {
            NoteKind::Plain => EntryDoc::Plain(doc),
            NoteKind::NewNote => EntryDoc::NewNote(doc),
        }
    }

    /// Returns the document id.
    pub fn id(&self) -> &DocumentId {
        match self {
            EntryDoc::Leaf(leaf) => &leaf.id,
            EntryDoc::Plain(note) | EntryDoc::NewNote(note) => &note.id,
        }
    }

    /// Returns the revision, if any.
    pub fn rev(&self) -> Option<&str> {
        match self {
            EntryDoc::Leaf(leaf) => leaf.rev.as_deref(),
            EntryDoc::Plain(note) | EntryDoc::NewNote(note) => note.rev.as_deref(),
        }
    }

    /// Splits into kind and note when this is a metadata entry.
    pub fn into_note(self) -> Option<(NoteKind, NoteDoc)> {
        match self {
            EntryDoc::Plain(note) => Some((NoteKind::Plain, note)),
            EntryDoc::NewNote(note) => Some((NoteKind::NewNote, note)),
            EntryDoc::Leaf(_) => None,
        }
    }
}
