//! The `_changes` feed.
//!
//! Two modes share one request shape (`style=all_docs`, `include_docs=true`,
//! `filter=replicate/pull`): the paged `feed=normal` mode returns one JSON
//! body per request; the `feed=continuous` mode streams line-delimited JSON
//! until the server-side timeout or an explicit abort.

use reqwest::Method;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::sync::watch;

use crate::client::CouchClient;
use crate::framing::LineFramer;
use crate::RemoteError;

/// Server-side replication filter applied to both feed modes.
pub const CHANGES_FILTER: &str = "replicate/pull";

/// Heartbeat interval the server is asked for in continuous mode.
pub const HEARTBEAT_MS: u64 = 5_000;

/// Server-side connection timeout in continuous mode.
pub const SERVER_TIMEOUT_MS: u64 = 100_000;

/// Slack on top of the server timeout before the client gives up.
const CLIENT_TIMEOUT_SLACK_MS: u64 = 30_000;

/// One row of a change feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRow {
    /// Opaque cursor token; monotonic within a database
    #[serde(deserialize_with = "seq_string")]
    pub seq: String,
    /// Changed document id
    pub id: String,
    /// True when the document was purged server-side
    #[serde(default)]
    pub deleted: bool,
    /// The document body (requests always set `include_docs`)
    #[serde(default)]
    pub doc: Option<Value>,
}

/// A page of the normal-mode feed.
#[derive(Debug, Deserialize)]
pub struct ChangesPage {
    /// Rows in `seq` order
    pub results: Vec<ChangeRow>,
    /// Cursor after the last row of this page
    #[serde(deserialize_with = "seq_string")]
    pub last_seq: String,
    /// Changes remaining beyond this page
    #[serde(default)]
    pub pending: i64,
}

/// Sequence tokens are strings on modern servers and integers on old ones;
/// either way they are opaque to us.
fn seq_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

impl CouchClient {
    /// One page of changes after `since` (`feed=normal`).
    pub async fn changes_page(
        &self,
        since: &str,
        limit: usize,
    ) -> Result<ChangesPage, RemoteError> {
        let url = self.endpoint(&["_changes"])?;
        let response = self
            .request(Method::GET, url)
            .query(&[
                ("feed", "normal"),
                ("style", "all_docs"),
                ("include_docs", "true"),
                ("filter", CHANGES_FILTER),
                ("since", since),
                ("limit", limit.to_string().as_str()),
            ])
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Opens the continuous feed after `since`.
    ///
    /// The returned reader yields complete JSON lines until the server closes
    /// the connection or `cancel` flips to true.
    pub async fn changes_continuous(
        &self,
        since: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<ContinuousChanges, RemoteError> {
        let url = self.endpoint(&["_changes"])?;
        let response = self
            .request(Method::GET, url)
            .query(&[
                ("feed", "continuous"),
                ("style", "all_docs"),
                ("include_docs", "true"),
                ("filter", CHANGES_FILTER),
                ("since", since),
                ("heartbeat", HEARTBEAT_MS.to_string().as_str()),
                ("timeout", SERVER_TIMEOUT_MS.to_string().as_str()),
            ])
            .timeout(std::time::Duration::from_millis(
                SERVER_TIMEOUT_MS + CLIENT_TIMEOUT_SLACK_MS,
            ))
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        let response = Self::check(response).await?;
        Ok(ContinuousChanges {
            response,
            framer: LineFramer::new(),
            cancel,
        })
    }
}

/// Line reader over an open continuous feed.
pub struct ContinuousChanges {
    response: reqwest::Response,
    framer: LineFramer,
    cancel: watch::Receiver<bool>,
}

impl ContinuousChanges {
    /// Reads the next non-empty feed line.
    ///
    /// `Ok(None)` means the server ended the stream (reconnectable);
    /// [`RemoteError::Aborted`] means the abort handle fired and the caller
    /// must not reconnect. Heartbeat lines are skipped here.
    pub async fn next_line(&mut self) -> Result<Option<String>, RemoteError> {
        loop {
            if let Some(line) = self.framer.next_line()? {
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }

            if *self.cancel.borrow() {
                return Err(RemoteError::Aborted);
            }

            tokio::select! {
                changed = self.cancel.changed() => {
                    match changed {
                        Ok(()) if *self.cancel.borrow() => return Err(RemoteError::Aborted),
                        Ok(()) => continue,
                        // Sender gone: nobody can un-cancel us, stop reading.
                        Err(_) => return Err(RemoteError::Aborted),
                    }
                }
                chunk = self.response.chunk() => {
                    match chunk {
                        Ok(Some(bytes)) => self.framer.push(&bytes),
                        Ok(None) => return Ok(None),
                        Err(e) => return Err(RemoteError::Transport(e)),
                    }
                }
            }
        }
    }
}
