//! The store core.
//!
//! [`LiveStore`] owns the chunk cache and the change-feed cursor, and talks
//! to the remote through [`CouchClient`]. It is cheap to clone; clones share
//! the same cache, cursor, and connection state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};
use vellum_chunk::split_segments;
use vellum_core::docs::{EntryDoc, LeafDoc, NoteDoc, NoteKind};
use vellum_core::time::now_ms;
use vellum_core::{CryptoError, DocumentId, FilePath, PieceCipher};
use vellum_remote::{CouchClient, DbInfo};

use crate::cache::{CacheConfig, ChunkCache};
use crate::config::Settings;
use crate::entry::{EntryInfo, FileEntry};
use crate::StoreError;

/// The client-side content-addressed note store.
#[derive(Clone, Debug)]
pub struct LiveStore {
    pub(crate) settings: Arc<Settings>,
    pub(crate) client: Arc<CouchClient>,
    pub(crate) cache: Arc<Mutex<ChunkCache>>,
    piece_cipher: Option<Arc<PieceCipher>>,
    path_cipher: Option<Arc<PieceCipher>>,
    since: Arc<Mutex<String>>,
}

impl LiveStore {
    /// Builds a store from validated settings.
    pub fn new(settings: Settings) -> Result<Self, StoreError> {
        Self::with_cache_config(settings, CacheConfig::default())
    }

    /// Builds a store with explicit cache bounds.
    pub fn with_cache_config(
        settings: Settings,
        cache_config: CacheConfig,
    ) -> Result<Self, StoreError> {
        settings.validate()?;
        let client = CouchClient::new(&settings.remote_config())?;
        let dynamic = settings.dynamic_iterations();
        let piece_cipher = settings
            .passphrase
            .as_deref()
            .map(|p| Arc::new(PieceCipher::new(p, dynamic)));
        let path_cipher = settings
            .obfuscate_passphrase
            .as_deref()
            .map(|p| Arc::new(PieceCipher::new(p, dynamic)));
        Ok(Self {
            settings: Arc::new(settings),
            client: Arc::new(client),
            cache: Arc::new(Mutex::new(ChunkCache::new(cache_config))),
            piece_cipher,
            path_cipher,
            since: Arc::new(Mutex::new("0".to_string())),
        })
    }

    /// Current change-feed cursor.
    pub fn since(&self) -> String {
        self.since.lock().clone()
    }

    /// Restores a persisted change-feed cursor.
    pub fn set_since(&self, seq: impl Into<String>) {
        *self.since.lock() = seq.into();
    }

    /// Probes the remote database.
    pub async fn database_info(&self) -> Result<DbInfo, StoreError> {
        Ok(self.client.db_info().await?)
    }

    /// Maps a path to its document id, rejecting reserved targets.
    pub(crate) fn doc_id(&self, path: &FilePath) -> Result<DocumentId, StoreError> {
        let id = path.to_document_id(self.settings.obfuscate_passphrase.as_deref());
        if id.is_reserved() {
            return Err(StoreError::Config(format!(
                "path {path} maps to reserved document id {id}"
            )));
        }
        Ok(id)
    }

    /// Reads a note by path.
    ///
    /// Returns `Ok(None)` when the path is absent or the document at its id
    /// is not a note. With `meta_only` the content is not assembled and
    /// `data` comes back empty.
    pub async fn get(
        &self,
        path: &FilePath,
        meta_only: bool,
    ) -> Result<Option<FileEntry>, StoreError> {
        let id = self.doc_id(path)?;
        let Some(value) = self.client.get_doc(&id).await? else {
            return Ok(None);
        };
        self.entry_from_value(value, meta_only).await
    }

    /// Writes a note.
    ///
    /// Content is split into pieces, missing leaves are uploaded in one bulk
    /// request, and the metadata entry is written last with the prior
    /// revision attached. A racing metadata update surfaces as
    /// [`StoreError::Conflict`].
    pub async fn put(
        &self,
        path: &FilePath,
        segments: Vec<String>,
        info: EntryInfo,
        kind: NoteKind,
    ) -> Result<(), StoreError> {
        let id = self.doc_id(path)?;
        let splitter_config = self.settings.splitter_config(path);
        splitter_config
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let passphrase = self.settings.passphrase.as_deref();

        // Resolve piece ids, reusing the cache to skip hashing text we have
        // seen recently.
        let mut children: Vec<DocumentId> = Vec::new();
        let mut unique: Vec<(DocumentId, Arc<str>)> = Vec::new();
        let mut seen: HashSet<DocumentId> = HashSet::new();
        for piece in split_segments(segments, splitter_config) {
            let piece: Arc<str> = Arc::from(piece);
            let piece_id = self
                .cache
                .lock()
                .get_by_text(&piece)
                .unwrap_or_else(|| DocumentId::leaf(&piece, passphrase));
            if seen.insert(piece_id.clone()) {
                unique.push((piece_id.clone(), piece.clone()));
            }
            children.push(piece_id);
        }

        // Probe the remote for leaves it already holds.
        let unique_ids: Vec<DocumentId> = unique.iter().map(|(id, _)| id.clone()).collect();
        let present: HashSet<String> = if unique_ids.is_empty() {
            HashSet::new()
        } else {
            self.client
                .all_docs_keys(&unique_ids, false)
                .await?
                .into_iter()
                .filter(|row| row.exists())
                .map(|row| row.key)
                .collect()
        };

        // Encrypt and upload only the missing leaves.
        let missing: Vec<&(DocumentId, Arc<str>)> = unique
            .iter()
            .filter(|(piece_id, _)| !present.contains(piece_id.as_str()))
            .collect();
        if !missing.is_empty() {
            let docs: Vec<EntryDoc> = missing
                .iter()
                .map(|(piece_id, text)| {
                    let data = match &self.piece_cipher {
                        Some(cipher) => cipher.encrypt(text)?,
                        None => text.to_string(),
                    };
                    Ok(EntryDoc::Leaf(LeafDoc {
                        id: piece_id.clone(),
                        rev: None,
                        data,
                    }))
                })
                .collect::<Result<_, StoreError>>()?;
            let results = self.client.bulk_docs(&docs).await?;
            for result in &results {
                if result.accepted() {
                    continue;
                }
                if result.is_conflict() {
                    // Content-addressed: an identical leaf beat us to it.
                    debug!(
                        id = result.id.as_deref().unwrap_or_default(),
                        "leaf already stored"
                    );
                    continue;
                }
                return Err(StoreError::Write {
                    id: result.id.clone().unwrap_or_default(),
                    reason: result
                        .reason
                        .clone()
                        .or_else(|| result.error.clone())
                        .unwrap_or_else(|| "unknown bulk error".to_string()),
                });
            }
            debug!(id = %id, uploaded = missing.len(), total = children.len(), "uploaded leaves");
        }

        // Every referenced piece is on the remote now; remember all of them.
        {
            let mut cache = self.cache.lock();
            for (piece_id, text) in &unique {
                cache.insert(piece_id.clone(), text.clone());
            }
        }

        // Attach the prior revision, if the path already exists.
        let rev = match self.client.get_doc(&id).await? {
            Some(value) => value
                .get("_rev")
                .and_then(Value::as_str)
                .map(str::to_string),
            None => None,
        };

        let wire_path = match &self.path_cipher {
            Some(cipher) => cipher.encrypt(path.as_str())?,
            None => path.as_str().to_string(),
        };

        let note = NoteDoc {
            id: id.clone(),
            rev,
            path: wire_path,
            children,
            ctime: info.ctime,
            mtime: info.mtime,
            size: info.size,
            deleted: false,
        };
        self.client.put_doc(&EntryDoc::note(kind, note)).await?;
        info!(id = %id, size = info.size, "stored note");
        Ok(())
    }

    /// Marks a note deleted.
    ///
    /// Idempotent: an absent or already-deleted path is a success. The
    /// tombstone keeps its id and path but drops children and size.
    pub async fn delete(&self, path: &FilePath) -> Result<(), StoreError> {
        let id = self.doc_id(path)?;
        let Some(value) = self.client.get_doc(&id).await? else {
            debug!(id = %id, "delete of absent path");
            return Ok(());
        };
        let Ok(doc) = serde_json::from_value::<EntryDoc>(value) else {
            return Ok(());
        };
        let Some((kind, note)) = doc.into_note() else {
            return Ok(());
        };
        if note.deleted {
            debug!(id = %id, "delete of already-deleted path");
            return Ok(());
        }

        let tombstone = NoteDoc {
            id: note.id,
            rev: note.rev,
            path: note.path,
            children: Vec::new(),
            ctime: note.ctime,
            mtime: now_ms(),
            size: 0,
            deleted: true,
        };
        self.client.put_doc(&EntryDoc::note(kind, tombstone)).await?;
        info!(id = %id, "stored tombstone");
        Ok(())
    }

    /// Parses a raw document and loads it as a note entry.
    ///
    /// Non-note documents (leaves, system entries, unknown types) yield
    /// `Ok(None)`.
    pub(crate) async fn entry_from_value(
        &self,
        value: Value,
        meta_only: bool,
    ) -> Result<Option<FileEntry>, StoreError> {
        let Ok(doc) = serde_json::from_value::<EntryDoc>(value) else {
            return Ok(None);
        };
        let Some((kind, note)) = doc.into_note() else {
            return Ok(None);
        };
        self.load_note(kind, note, meta_only).await.map(Some)
    }

    /// Assembles a loaded entry from its metadata document.
    pub(crate) async fn load_note(
        &self,
        kind: NoteKind,
        note: NoteDoc,
        meta_only: bool,
    ) -> Result<FileEntry, StoreError> {
        let path = match &self.path_cipher {
            Some(cipher) => FilePath::new(cipher.decrypt(&note.path)?),
            None => FilePath::new(note.path.clone()),
        };
        let data = if meta_only || note.children.is_empty() {
            String::new()
        } else {
            let pieces = self.collect_chunks(&note.children).await?;
            pieces.iter().map(|p| p.as_ref()).collect()
        };
        Ok(FileEntry {
            id: note.id,
            rev: note.rev,
            path,
            kind,
            data,
            children: note.children,
            ctime: note.ctime,
            mtime: note.mtime,
            size: note.size,
            deleted: note.deleted,
        })
    }

    /// Resolves chunk ids to plaintext, in order.
    ///
    /// Cache hits are served locally; the rest arrive in one bulk fetch. Any
    /// unresolvable child is a hard integrity error.
    pub(crate) async fn collect_chunks(
        &self,
        children: &[DocumentId],
    ) -> Result<Vec<Arc<str>>, StoreError> {
        let mut resolved: HashMap<DocumentId, Arc<str>> = HashMap::new();
        let mut missing: Vec<DocumentId> = Vec::new();
        {
            let mut cache = self.cache.lock();
            for child in children {
                if resolved.contains_key(child) {
                    continue;
                }
                match cache.get_by_id(child) {
                    Some(text) => {
                        resolved.insert(child.clone(), text);
                    }
                    None => {
                        if !missing.contains(child) {
                            missing.push(child.clone());
                        }
                    }
                }
            }
        }

        if !missing.is_empty() {
            let rows = self.client.all_docs_keys(&missing, true).await?;
            for row in rows {
                let Some(doc_value) = row.doc else {
                    return Err(StoreError::Integrity(format!("missing leaf {}", row.key)));
                };
                let leaf = match serde_json::from_value::<EntryDoc>(doc_value) {
                    Ok(EntryDoc::Leaf(leaf)) => leaf,
                    _ => {
                        return Err(StoreError::Integrity(format!(
                            "document {} is not a leaf",
                            row.key
                        )))
                    }
                };
                let text: Arc<str> = if leaf.id.is_encrypted_chunk() {
                    let cipher = self
                        .piece_cipher
                        .as_ref()
                        .ok_or(StoreError::Decrypt(CryptoError::DecryptFailed))?;
                    Arc::from(cipher.decrypt(&leaf.data)?)
                } else {
                    Arc::from(leaf.data)
                };

                // A leaf must hash back to its own id.
                let expected = if leaf.id.is_encrypted_chunk() {
                    DocumentId::leaf(&text, self.settings.passphrase.as_deref())
                } else {
                    DocumentId::leaf(&text, None)
                };
                if expected != leaf.id {
                    warn!(id = %leaf.id, "leaf payload does not hash to its id");
                    return Err(StoreError::Integrity(format!("corrupted leaf {}", leaf.id)));
                }

                self.cache.lock().insert(leaf.id.clone(), text.clone());
                resolved.insert(leaf.id, text);
            }
        }

        children
            .iter()
            .map(|child| {
                resolved
                    .get(child)
                    .cloned()
                    .ok_or_else(|| StoreError::Integrity(format!("missing leaf {child}")))
            })
            .collect()
    }
}
