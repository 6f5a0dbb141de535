//! The CouchDB client.
//!
//! One [`CouchClient`] per configured database. All methods are plain
//! request/response; the streaming change feed lives in [`crate::changes`].

use std::time::Duration;

use reqwest::{header, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use vellum_core::docs::EntryDoc;
use vellum_core::DocumentId;

use crate::RemoteError;

/// Timeout for plain request/response calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body excerpt carried in an error.
const ERROR_BODY_LIMIT: usize = 500;

/// Connection settings for a remote database.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Server base URL, e.g. `https://couch.example.org:5984`
    pub url: String,
    /// HTTP Basic username
    pub username: String,
    /// HTTP Basic password
    pub password: String,
    /// Database name
    pub database: String,
}

/// Typed HTTP client for one CouchDB-compatible database.
#[derive(Debug)]
pub struct CouchClient {
    http: reqwest::Client,
    base: Url,
    database: String,
    username: String,
    password: String,
}

/// Database information from `GET /{db}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DbInfo {
    /// Database name
    pub db_name: String,
    /// Number of documents
    #[serde(default)]
    pub doc_count: u64,
}

/// One row of an `_all_docs` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsRow {
    /// Requested or matched key
    pub key: String,
    /// Document id, absent for missing keys
    #[serde(default)]
    pub id: Option<String>,
    /// Revision info, absent for missing keys
    #[serde(default)]
    pub value: Option<AllDocsRowValue>,
    /// The document, when `include_docs` was set
    #[serde(default)]
    pub doc: Option<Value>,
    /// `"not_found"` for missing keys
    #[serde(default)]
    pub error: Option<String>,
}

/// The `value` object of an `_all_docs` row.
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsRowValue {
    /// Current revision
    pub rev: String,
    /// True when the document is deleted
    #[serde(default)]
    pub deleted: bool,
}

impl AllDocsRow {
    /// True when the key resolves to a live document.
    pub fn exists(&self) -> bool {
        self.error.is_none() && self.value.as_ref().is_some_and(|v| !v.deleted)
    }
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

/// One per-document result of a `_bulk_docs` write.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDocResult {
    /// Document id
    #[serde(default)]
    pub id: Option<String>,
    /// New revision on success
    #[serde(default)]
    pub rev: Option<String>,
    /// Error token, e.g. `"conflict"`
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable error reason
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkDocResult {
    /// True when the document was accepted.
    pub fn accepted(&self) -> bool {
        self.error.is_none()
    }

    /// True for a revision conflict, which is benign for content-addressed
    /// leaves: the payload is already present.
    pub fn is_conflict(&self) -> bool {
        self.error.as_deref() == Some("conflict")
    }
}

/// Acknowledgement of a single-document `PUT`.
#[derive(Debug, Clone, Deserialize)]
pub struct PutResult {
    /// Document id
    pub id: String,
    /// New revision
    pub rev: String,
}

impl CouchClient {
    /// Builds a client for the configured database.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let base = Url::parse(config.url.trim_end_matches('/'))
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(config.url.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RemoteError::Transport)?;
        Ok(Self {
            http,
            base,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Builds the URL for a path below the database, percent-encoding each
    /// segment (document ids may contain `/` and `:`).
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| RemoteError::InvalidUrl(self.base.to_string()))?;
            parts.pop_if_empty();
            parts.push(&self.database);
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header(header::CONTENT_TYPE, "application/json")
    }

    /// Maps a non-2xx response to the corresponding error.
    pub(crate) async fn check(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Auth {
                status: status.as_u16(),
            }),
            StatusCode::CONFLICT => Err(RemoteError::Conflict),
            _ => {
                let mut body = response.text().await.unwrap_or_default();
                if body.len() > ERROR_BODY_LIMIT {
                    let mut cut = ERROR_BODY_LIMIT;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                Err(RemoteError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// `GET /{db}`: database info, used as a connectivity probe.
    pub async fn db_info(&self) -> Result<DbInfo, RemoteError> {
        let url = self.endpoint(&[])?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// `GET /{db}/{id}`: one document, or `None` for 404.
    pub async fn get_doc(&self, id: &DocumentId) -> Result<Option<Value>, RemoteError> {
        let url = self.endpoint(&[id.as_str()])?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(Some(value))
    }

    /// `PUT /{db}/{id}`: writes one document; 409 maps to
    /// [`RemoteError::Conflict`].
    pub async fn put_doc(&self, doc: &EntryDoc) -> Result<PutResult, RemoteError> {
        let url = self.endpoint(&[doc.id().as_str()])?;
        let response = self
            .request(Method::PUT, url)
            .json(doc)
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        let result: PutResult = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        debug!(id = %result.id, rev = %result.rev, "stored document");
        Ok(result)
    }

    /// `POST /{db}/_all_docs` with explicit keys: existence probe or bulk
    /// fetch depending on `include_docs`.
    pub async fn all_docs_keys(
        &self,
        keys: &[DocumentId],
        include_docs: bool,
    ) -> Result<Vec<AllDocsRow>, RemoteError> {
        let url = self.endpoint(&["_all_docs"])?;
        let response = self
            .request(Method::POST, url)
            .query(&[("include_docs", include_docs)])
            .json(&json!({ "keys": keys }))
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        let parsed: AllDocsResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(parsed.rows)
    }

    /// `GET /{db}/_all_docs` over a half-open key range, ascending id order.
    pub async fn all_docs_range(
        &self,
        startkey: &str,
        endkey: &str,
        limit: usize,
        skip: usize,
        include_docs: bool,
    ) -> Result<Vec<AllDocsRow>, RemoteError> {
        let url = self.endpoint(&["_all_docs"])?;
        let response = self
            .request(Method::GET, url)
            .query(&[
                ("startkey", json_key(startkey).as_str()),
                ("endkey", json_key(endkey).as_str()),
                ("inclusive_end", "false"),
                ("limit", limit.to_string().as_str()),
                ("skip", skip.to_string().as_str()),
                ("include_docs", if include_docs { "true" } else { "false" }),
            ])
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        let parsed: AllDocsResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(parsed.rows)
    }

    /// `POST /{db}/_bulk_docs`: uploads documents, one result each.
    pub async fn bulk_docs(&self, docs: &[EntryDoc]) -> Result<Vec<BulkDocResult>, RemoteError> {
        let url = self.endpoint(&["_bulk_docs"])?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "docs": docs }))
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

/// CouchDB range keys are JSON-encoded strings inside the query value.
fn json_key(key: &str) -> String {
    Value::String(key.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CouchClient {
        CouchClient::new(&RemoteConfig {
            url: "http://couch.example.org:5984".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            database: "notes".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_unparseable_url() {
        let result = CouchClient::new(&RemoteConfig {
            url: "not a url".to_string(),
            username: String::new(),
            password: String::new(),
            database: "db".to_string(),
        });
        assert!(matches!(result, Err(RemoteError::InvalidUrl(_))));
    }

    #[test]
    fn test_endpoint_joins_database() {
        let url = client().endpoint(&["_all_docs"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://couch.example.org:5984/notes/_all_docs"
        );
    }

    #[test]
    fn test_endpoint_percent_encodes_doc_ids() {
        let url = client().endpoint(&["a/b.md"]).unwrap();
        assert_eq!(url.as_str(), "http://couch.example.org:5984/notes/a%2Fb.md");

        let url = client().endpoint(&["h:+x9"]).unwrap();
        assert!(url.as_str().ends_with("/notes/h:+x9"));
    }

    #[test]
    fn test_endpoint_with_base_path() {
        let client = CouchClient::new(&RemoteConfig {
            url: "http://host/prefix/".to_string(),
            username: String::new(),
            password: String::new(),
            database: "db".to_string(),
        })
        .unwrap();
        let url = client.endpoint(&["doc"]).unwrap();
        assert_eq!(url.as_str(), "http://host/prefix/db/doc");
    }

    #[test]
    fn test_all_docs_row_exists() {
        let live: AllDocsRow = serde_json::from_value(json!({
            "key": "a", "id": "a", "value": {"rev": "1-x"}
        }))
        .unwrap();
        assert!(live.exists());

        let missing: AllDocsRow =
            serde_json::from_value(json!({ "key": "b", "error": "not_found" })).unwrap();
        assert!(!missing.exists());

        let deleted: AllDocsRow = serde_json::from_value(json!({
            "key": "c", "id": "c", "value": {"rev": "2-y", "deleted": true}
        }))
        .unwrap();
        assert!(!deleted.exists());
    }

    #[test]
    fn test_bulk_result_classification() {
        let ok: BulkDocResult =
            serde_json::from_value(json!({"ok": true, "id": "h:a", "rev": "1-x"})).unwrap();
        assert!(ok.accepted());
        assert!(!ok.is_conflict());

        let conflict: BulkDocResult = serde_json::from_value(json!({
            "id": "h:a", "error": "conflict", "reason": "Document update conflict."
        }))
        .unwrap();
        assert!(!conflict.accepted());
        assert!(conflict.is_conflict());

        let forbidden: BulkDocResult = serde_json::from_value(json!({
            "id": "h:a", "error": "forbidden", "reason": "nope"
        }))
        .unwrap();
        assert!(!forbidden.accepted());
        assert!(!forbidden.is_conflict());
    }

    #[test]
    fn test_json_key_encoding() {
        assert_eq!(json_key("h:"), "\"h:\"");
        assert_eq!(json_key("a\"b"), "\"a\\\"b\"");
    }
}
