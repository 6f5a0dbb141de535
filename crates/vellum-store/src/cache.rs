//! Bidirectional chunk cache.
//!
//! Maps chunk id to plaintext and plaintext back to chunk id. The forward
//! direction serves reads without refetching; the reverse direction lets the
//! write path reuse an id for a piece it has seen recently without hashing
//! it again. Bounded by entry count and by aggregate plaintext bytes;
//! eviction is least-recently-used and always removes both directions
//! together.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use vellum_core::DocumentId;

/// Cache bounds.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum number of cached chunks
    pub max_entries: usize,
    /// Maximum aggregate plaintext bytes
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Chunk-id ⇄ plaintext cache.
#[derive(Debug)]
pub struct ChunkCache {
    forward: LruCache<DocumentId, Arc<str>>,
    reverse: HashMap<Arc<str>, DocumentId>,
    total_bytes: usize,
    max_bytes: usize,
}

impl ChunkCache {
    /// Creates a cache with the given bounds.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries)
            .unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is non-zero"));
        Self {
            forward: LruCache::new(capacity),
            reverse: HashMap::new(),
            total_bytes: 0,
            max_bytes: config.max_bytes,
        }
    }

    /// Creates a cache with default bounds.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Inserts a chunk in both directions, evicting as needed.
    pub fn insert(&mut self, id: DocumentId, plaintext: Arc<str>) {
        if let Some(existing) = self.forward.get(&id) {
            // Content-addressed: same id, same text. Touching is enough.
            debug_assert_eq!(existing.as_ref(), plaintext.as_ref());
            return;
        }

        self.total_bytes += plaintext.len();
        self.reverse.insert(plaintext.clone(), id.clone());
        if let Some((_, old_text)) = self.forward.push(id, plaintext) {
            self.forget(&old_text);
        }

        while self.total_bytes > self.max_bytes {
            match self.forward.pop_lru() {
                Some((_, old_text)) => self.forget(&old_text),
                None => break,
            }
        }
    }

    /// Looks up the plaintext for a chunk id, marking it recently used.
    pub fn get_by_id(&mut self, id: &DocumentId) -> Option<Arc<str>> {
        self.forward.get(id).cloned()
    }

    /// Looks up the chunk id for a plaintext, marking it recently used.
    pub fn get_by_text(&mut self, plaintext: &str) -> Option<DocumentId> {
        let id = self.reverse.get(plaintext)?.clone();
        self.forward.get(&id);
        Some(id)
    }

    /// Number of cached chunks.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Aggregate plaintext bytes currently held.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.total_bytes = 0;
    }

    fn forget(&mut self, text: &Arc<str>) {
        self.reverse.remove(text.as_ref());
        self.total_bytes = self.total_bytes.saturating_sub(text.len());
    }
}
