//! Change-feed readers.
//!
//! Two readers share the store's `since` cursor. [`LiveStore::begin_watch`]
//! runs the continuous feed as an explicit state machine with automatic
//! reconnection; [`LiveStore::follow_updates`] drains the paged feed once.
//! In both, a document that fails to load is logged and skipped, never
//! halting the stream.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use vellum_remote::RemoteError;

use crate::entry::FileEntry;
use crate::store::LiveStore;
use crate::StoreError;

/// Delay before reconnecting a dropped continuous feed.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Page size for [`LiveStore::follow_updates`].
pub const FOLLOW_PAGE_LIMIT: usize = 25;

/// Lifecycle of the continuous watcher.
///
/// `Idle → Connecting → Streaming`, back through `Disconnected` to
/// `Connecting` on stream loss, and terminally to `Stopped` on abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Not yet started
    Idle,
    /// Opening the feed request
    Connecting,
    /// Receiving lines
    Streaming,
    /// Stream lost; reconnecting after a delay
    Disconnected,
    /// Terminated; will not reconnect
    Stopped,
}

/// Handle to a running continuous watcher.
pub struct WatchHandle {
    cancel: watch::Sender<bool>,
    state: Arc<Mutex<WatchState>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Current watcher state.
    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    /// Stops the watcher: aborts any in-flight request, cuts the reconnect
    /// timer, and waits for the task to wind down. Returns the terminal
    /// state.
    pub async fn stop(self) -> WatchState {
        let _ = self.cancel.send(true);
        let _ = self.task.await;
        *self.state.lock()
    }
}

impl LiveStore {
    /// Starts the continuous watcher.
    ///
    /// `callback` is invoked serially, in `seq` order, once per loadable
    /// changed note. The cursor is advanced before the callback runs, so a
    /// persisted cursor never replays a delivered change.
    pub fn begin_watch<F>(&self, callback: F) -> WatchHandle
    where
        F: FnMut(FileEntry, String) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(WatchState::Idle));
        let store = self.clone();
        let task_state = state.clone();
        let task = tokio::spawn(async move {
            store.watch_loop(task_state, cancel_rx, callback).await;
        });
        WatchHandle {
            cancel: cancel_tx,
            state,
            task,
        }
    }

    async fn watch_loop<F>(
        &self,
        state: Arc<Mutex<WatchState>>,
        mut cancel: watch::Receiver<bool>,
        mut callback: F,
    ) where
        F: FnMut(FileEntry, String) + Send + 'static,
    {
        loop {
            if *cancel.borrow() {
                break;
            }
            *state.lock() = WatchState::Connecting;
            let since = self.since();

            let connection = tokio::select! {
                result = self.client.changes_continuous(&since, cancel.clone()) => result,
                _ = cancelled(&mut cancel) => Err(RemoteError::Aborted),
            };
            match connection {
                Err(RemoteError::Aborted) => break,
                Err(e) => {
                    warn!(error = %e, "change feed connection failed");
                    *state.lock() = WatchState::Disconnected;
                    if !sleep_or_cancel(&mut cancel).await {
                        break;
                    }
                }
                Ok(mut stream) => {
                    *state.lock() = WatchState::Streaming;
                    debug!(since = %since, "change feed connected");
                    let aborted = loop {
                        match stream.next_line().await {
                            Ok(Some(line)) => {
                                self.handle_change_line(&line, &mut callback).await
                            }
                            Ok(None) => break false,
                            Err(RemoteError::Aborted) => break true,
                            Err(e) => {
                                warn!(error = %e, "change feed read failed");
                                break false;
                            }
                        }
                    };
                    if aborted {
                        break;
                    }
                    *state.lock() = WatchState::Disconnected;
                    if !sleep_or_cancel(&mut cancel).await {
                        break;
                    }
                }
            }
        }
        *state.lock() = WatchState::Stopped;
        info!("change feed watcher stopped");
    }

    /// Processes one feed line: advance the cursor, then load and deliver
    /// the document if the line carries one.
    async fn handle_change_line<F>(&self, line: &str, callback: &mut F)
    where
        F: FnMut(FileEntry, String),
    {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "skipping unparseable feed line");
                return;
            }
        };

        let seq = value.get("seq").map(seq_token);
        if let Some(seq) = &seq {
            self.set_since(seq.clone());
        }

        let Some(doc) = value.get("doc") else {
            return;
        };
        match self.entry_from_value(doc.clone(), false).await {
            Ok(Some(entry)) => {
                let seq = seq.unwrap_or_else(|| self.since());
                callback(entry, seq);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "skipping change that failed to load"),
        }
    }

    /// Drains the paged feed until the server reports nothing pending, and
    /// returns the final cursor.
    ///
    /// A stream-level failure ends the drain early with the last known
    /// cursor; per-document failures are logged and skipped.
    pub async fn follow_updates<F>(&self, mut callback: F) -> Result<String, StoreError>
    where
        F: FnMut(FileEntry, String),
    {
        loop {
            let since = self.since();
            let page = match self.client.changes_page(&since, FOLLOW_PAGE_LIMIT).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "change feed page failed; stopping at last cursor");
                    return Ok(self.since());
                }
            };

            for row in &page.results {
                self.set_since(row.seq.clone());
                let Some(doc) = &row.doc else {
                    continue;
                };
                match self.entry_from_value(doc.clone(), false).await {
                    Ok(Some(entry)) => callback(entry, row.seq.clone()),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(id = %row.id, error = %e, "skipping change that failed to load")
                    }
                }
            }

            self.set_since(page.last_seq.clone());
            debug!(last_seq = %page.last_seq, pending = page.pending, "processed change page");
            if page.pending <= 0 {
                return Ok(page.last_seq);
            }
        }
    }
}

fn seq_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves once the abort flag flips to true (or its sender is gone).
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Waits out the reconnect delay. Returns false when cancelled meanwhile.
async fn sleep_or_cancel(cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(RECONNECT_DELAY) => true,
        _ = cancelled(cancel) => false,
    }
}
