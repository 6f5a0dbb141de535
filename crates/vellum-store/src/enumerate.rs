//! Enumeration over all normal metadata documents.
//!
//! The non-chunk id space is covered by five disjoint half-open key ranges
//! that skip the reserved prefixes (`h:` chunks, `i:`/`ix:` plugin data,
//! `ps:` settings). Each range is paged through `_all_docs` in ascending id
//! order with one page of read-ahead: the next request is already in flight
//! while the current page is decrypted and assembled.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::task::{JoinHandle, JoinSet};
use tracing::warn;
use vellum_remote::{AllDocsRow, RemoteError};

use crate::entry::FileEntry;
use crate::store::LiveStore;
use crate::StoreError;

/// Rows fetched per `_all_docs` request.
pub(crate) const PAGE_SIZE: usize = 100;

/// Entries decrypted and assembled concurrently per batch.
pub(crate) const ASSEMBLY_CONCURRENCY: usize = 5;

/// The five `[start, end)` ranges partitioning the non-chunk id space.
/// `\u{10FFFF}` is the highest representable character.
const KEY_RANGES: [(&str, &str); 5] = [
    ("", "h:"),
    ("h:\u{10FFFF}", "i:"),
    ("i:\u{10FFFF}", "ix:"),
    ("ix:\u{10FFFF}", "ps:"),
    ("ps:\u{10FFFF}", "\u{10FFFF}"),
];

impl LiveStore {
    /// Starts a lazy walk over every note in the database.
    ///
    /// Entries come back in ascending id order within each range, ranges in
    /// order. Entries that fail to decrypt or assemble are logged and
    /// skipped; they do not abort the walk.
    pub fn enumerate_all_normal_docs(&self, meta_only: bool) -> Enumerator {
        let mut enumerator = Enumerator {
            store: self.clone(),
            meta_only,
            buffer: VecDeque::new(),
            inflight: None,
            range_idx: 0,
            next_start: KEY_RANGES[0].0.to_string(),
            next_skip: 0,
        };
        enumerator.spawn_fetch();
        enumerator
    }
}

/// Pull-based entry stream; see
/// [`LiveStore::enumerate_all_normal_docs`].
pub struct Enumerator {
    store: LiveStore,
    meta_only: bool,
    buffer: VecDeque<FileEntry>,
    inflight: Option<JoinHandle<Result<Vec<AllDocsRow>, RemoteError>>>,
    range_idx: usize,
    next_start: String,
    next_skip: usize,
}

impl Enumerator {
    /// Yields the next entry, or `None` at the end of the walk.
    pub async fn next(&mut self) -> Result<Option<FileEntry>, StoreError> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(entry));
            }
            let Some(handle) = self.inflight.take() else {
                return Ok(None);
            };
            let rows = handle
                .await
                .map_err(|e| StoreError::Transient(format!("page fetch task failed: {e}")))??;

            // Advance the cursor and put the next page in flight before
            // assembling this one.
            if rows.len() < PAGE_SIZE {
                self.range_idx += 1;
                if self.range_idx < KEY_RANGES.len() {
                    self.next_start = KEY_RANGES[self.range_idx].0.to_string();
                    self.next_skip = 0;
                }
            } else if let Some(last) = rows.last() {
                self.next_start = last.key.clone();
                self.next_skip = 1;
            }
            self.spawn_fetch();

            self.assemble(rows).await;
        }
    }

    /// Collects the remaining entries into a vector.
    pub async fn collect(mut self) -> Result<Vec<FileEntry>, StoreError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    fn spawn_fetch(&mut self) {
        if self.range_idx >= KEY_RANGES.len() {
            return;
        }
        let client = self.store.client.clone();
        let start = self.next_start.clone();
        let end = KEY_RANGES[self.range_idx].1.to_string();
        let skip = self.next_skip;
        self.inflight = Some(tokio::spawn(async move {
            client
                .all_docs_range(&start, &end, PAGE_SIZE, skip, true)
                .await
        }));
    }

    /// Loads one page of rows into the buffer, a bounded batch at a time.
    async fn assemble(&mut self, rows: Vec<AllDocsRow>) {
        let docs: Vec<(String, Value)> = rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.key, doc)))
            .collect();
        let meta_only = self.meta_only;

        for batch in docs.chunks(ASSEMBLY_CONCURRENCY) {
            let mut tasks = JoinSet::new();
            for (offset, (key, doc)) in batch.iter().cloned().enumerate() {
                let store = self.store.clone();
                tasks.spawn(async move { (offset, key, store.entry_from_value(doc, meta_only).await) });
            }

            let mut loaded: Vec<(usize, FileEntry)> = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((offset, _, Ok(Some(entry)))) => loaded.push((offset, entry)),
                    Ok((_, _, Ok(None))) => {}
                    Ok((_, key, Err(e))) => {
                        warn!(id = %key, error = %e, "skipping entry that failed to load")
                    }
                    Err(e) => warn!(error = %e, "entry load task failed"),
                }
            }
            loaded.sort_by_key(|(offset, _)| *offset);
            self.buffer
                .extend(loaded.into_iter().map(|(_, entry)| entry));
        }
    }
}
