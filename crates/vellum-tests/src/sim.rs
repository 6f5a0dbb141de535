//! In-memory CouchDB simulator.
//!
//! Documents live in a `BTreeMap` so `_all_docs` range queries come back in
//! ascending id order like the real server. Every write bumps a numeric
//! sequence counter and appends to a change log; `_changes` replays the log
//! deduplicated to the latest change per document.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use vellum_store::Settings;

#[derive(Default)]
struct SimState {
    docs: BTreeMap<String, Value>,
    seq: u64,
    changes: Vec<(u64, String)>,
    rev_salt: u64,
}

impl SimState {
    fn next_rev(&mut self, old: Option<&str>) -> String {
        let generation = old
            .and_then(|rev| rev.split('-').next())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        self.rev_salt = self.rev_salt.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        format!("{generation}-{:016x}", self.rev_salt)
    }

    fn record_change(&mut self, id: &str) {
        self.seq += 1;
        self.changes.push((self.seq, id.to_string()));
    }

    /// Inserts or replaces a document, assigning a fresh revision.
    fn store_doc(&mut self, id: &str, mut doc: Value) -> String {
        let old_rev = self
            .docs
            .get(id)
            .and_then(|d| d.get("_rev"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let rev = self.next_rev(old_rev.as_deref());
        doc["_id"] = json!(id);
        doc["_rev"] = json!(rev);
        self.docs.insert(id.to_string(), doc);
        self.record_change(id);
        rev
    }

    /// Latest change per document after `since`, in sequence order.
    fn changes_after(&self, since: u64) -> Vec<(u64, String)> {
        let mut latest: BTreeMap<String, u64> = BTreeMap::new();
        for (seq, id) in &self.changes {
            if *seq > since {
                latest.insert(id.clone(), *seq);
            }
        }
        let mut rows: Vec<(u64, String)> = latest.into_iter().map(|(id, seq)| (seq, id)).collect();
        rows.sort();
        rows
    }
}

/// A wiremock-backed CouchDB stand-in.
pub struct CouchSim {
    server: MockServer,
    state: Arc<Mutex<SimState>>,
    database: String,
}

impl CouchSim {
    /// Starts the simulator for one database name.
    pub async fn start(database: &str) -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(SimState::default()));

        // Fixed endpoints outrank the catch-all document routes.
        Mock::given(method("POST"))
            .and(path(format!("/{database}/_all_docs")))
            .respond_with(AllDocsKeys(state.clone()))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{database}/_all_docs")))
            .respond_with(AllDocsRange(state.clone()))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{database}/_bulk_docs")))
            .respond_with(BulkDocs(state.clone()))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{database}/_changes")))
            .respond_with(Changes(state.clone()))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{database}")))
            .respond_with(Info {
                state: state.clone(),
                database: database.to_string(),
            })
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(format!("^/{database}/.+$")))
            .respond_with(GetDoc {
                state: state.clone(),
                database: database.to_string(),
            })
            .with_priority(5)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(format!("^/{database}/.+$")))
            .respond_with(PutDoc {
                state: state.clone(),
                database: database.to_string(),
            })
            .with_priority(5)
            .mount(&server)
            .await;

        Self {
            server,
            state,
            database: database.to_string(),
        }
    }

    /// Server base URL.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Store settings pointed at this simulator.
    pub fn settings(&self) -> Settings {
        Settings {
            url: self.url(),
            database: self.database.clone(),
            username: "tester".to_string(),
            password: "secret".to_string(),
            ..Settings::default()
        }
    }

    /// All document ids, ascending.
    pub fn doc_ids(&self) -> Vec<String> {
        self.state.lock().docs.keys().cloned().collect()
    }

    /// Ids of chunk leaf documents.
    pub fn leaf_ids(&self) -> Vec<String> {
        self.doc_ids()
            .into_iter()
            .filter(|id| id.starts_with("h:"))
            .collect()
    }

    /// Number of stored documents.
    pub fn doc_count(&self) -> usize {
        self.state.lock().docs.len()
    }

    /// Raw document lookup for assertions.
    pub fn get_raw(&self, id: &str) -> Option<Value> {
        self.state.lock().docs.get(id).cloned()
    }

    /// Writes a document from outside the store, as another client would.
    /// Returns the assigned revision.
    pub fn insert_raw(&self, id: &str, doc: Value) -> String {
        self.state.lock().store_doc(id, doc)
    }

    /// Current top of the change log.
    pub fn last_seq(&self) -> u64 {
        self.state.lock().seq
    }
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({"error": "not_found", "reason": "missing"}))
}

fn doc_id_from(request: &Request, database: &str) -> String {
    let prefix = format!("/{database}/");
    let raw = request.url.path().strip_prefix(&prefix).unwrap_or_default();
    percent_decode(raw)
}

fn query_param(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Decodes %XX escapes; enough for the ids the store produces.
fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

struct GetDoc {
    state: Arc<Mutex<SimState>>,
    database: String,
}

impl Respond for GetDoc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = doc_id_from(request, &self.database);
        match self.state.lock().docs.get(&id) {
            Some(doc) => ResponseTemplate::new(200).set_body_json(doc.clone()),
            None => not_found(),
        }
    }
}

struct PutDoc {
    state: Arc<Mutex<SimState>>,
    database: String,
}

impl Respond for PutDoc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = doc_id_from(request, &self.database);
        let Ok(doc) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400)
                .set_body_json(json!({"error": "bad_request", "reason": "invalid json"}));
        };

        let mut state = self.state.lock();
        let current_rev = state
            .docs
            .get(&id)
            .and_then(|d| d.get("_rev"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let offered_rev = doc.get("_rev").and_then(Value::as_str).map(str::to_string);
        if current_rev != offered_rev {
            return ResponseTemplate::new(409).set_body_json(
                json!({"error": "conflict", "reason": "Document update conflict."}),
            );
        }

        let rev = state.store_doc(&id, doc);
        ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": id, "rev": rev}))
    }
}

struct BulkDocs(Arc<Mutex<SimState>>);

impl Respond for BulkDocs {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400)
                .set_body_json(json!({"error": "bad_request", "reason": "invalid json"}));
        };
        let docs = body
            .get("docs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut state = self.0.lock();
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            let Some(id) = doc.get("_id").and_then(Value::as_str).map(str::to_string) else {
                results.push(json!({"error": "bad_request", "reason": "missing _id"}));
                continue;
            };
            let current_rev = state
                .docs
                .get(&id)
                .and_then(|d| d.get("_rev"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let offered_rev = doc.get("_rev").and_then(Value::as_str).map(str::to_string);
            if current_rev.is_some() && current_rev != offered_rev {
                results.push(json!({
                    "id": id, "error": "conflict", "reason": "Document update conflict."
                }));
                continue;
            }
            let rev = state.store_doc(&id, doc);
            results.push(json!({"ok": true, "id": id, "rev": rev}));
        }
        ResponseTemplate::new(201).set_body_json(Value::Array(results))
    }
}

struct AllDocsKeys(Arc<Mutex<SimState>>);

impl Respond for AllDocsKeys {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let include_docs = query_param(request, "include_docs").as_deref() == Some("true");
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400)
                .set_body_json(json!({"error": "bad_request", "reason": "invalid json"}));
        };
        let keys: Vec<String> = body
            .get("keys")
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let state = self.0.lock();
        let rows: Vec<Value> = keys
            .iter()
            .map(|key| match state.docs.get(key) {
                Some(doc) => {
                    let rev = doc.get("_rev").cloned().unwrap_or(Value::Null);
                    let mut row = json!({"id": key, "key": key, "value": {"rev": rev}});
                    if include_docs {
                        row["doc"] = doc.clone();
                    }
                    row
                }
                None => json!({"key": key, "error": "not_found"}),
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"rows": rows}))
    }
}

struct AllDocsRange(Arc<Mutex<SimState>>);

impl Respond for AllDocsRange {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let decode_key = |name: &str| -> Option<String> {
            query_param(request, name)
                .and_then(|raw| serde_json::from_str::<String>(&raw).ok())
        };
        let startkey = decode_key("startkey").unwrap_or_default();
        let endkey = decode_key("endkey");
        let inclusive_end = query_param(request, "inclusive_end").as_deref() != Some("false");
        let include_docs = query_param(request, "include_docs").as_deref() == Some("true");
        let limit = query_param(request, "limit")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let skip = query_param(request, "skip")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let state = self.0.lock();
        let rows: Vec<Value> = state
            .docs
            .range(startkey..)
            .filter(|(id, _)| match &endkey {
                Some(end) if inclusive_end => id.as_str() <= end.as_str(),
                Some(end) => id.as_str() < end.as_str(),
                None => true,
            })
            .skip(skip)
            .take(limit)
            .map(|(id, doc)| {
                let rev = doc.get("_rev").cloned().unwrap_or(Value::Null);
                let mut row = json!({"id": id, "key": id, "value": {"rev": rev}});
                if include_docs {
                    row["doc"] = doc.clone();
                }
                row
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"rows": rows}))
    }
}

struct Changes(Arc<Mutex<SimState>>);

impl Respond for Changes {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let since = query_param(request, "since")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let limit = query_param(request, "limit")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let continuous = query_param(request, "feed").as_deref() == Some("continuous");

        let state = self.0.lock();
        let all = state.changes_after(since);
        let delivered: Vec<Value> = all
            .iter()
            .take(limit)
            .filter_map(|(seq, id)| {
                let doc = state.docs.get(id)?;
                let rev = doc.get("_rev").cloned().unwrap_or(Value::Null);
                Some(json!({
                    "seq": seq,
                    "id": id,
                    "changes": [{"rev": rev}],
                    "doc": doc,
                }))
            })
            .collect();
        let last_seq = all
            .iter()
            .take(limit)
            .last()
            .map(|(seq, _)| *seq)
            .unwrap_or(since);
        let pending = all.len().saturating_sub(delivered.len()) as i64;

        if continuous {
            // The body is delivered whole; the client still sees it as a
            // line-delimited stream that ends when the connection closes.
            let mut body = String::new();
            for row in &delivered {
                body.push_str(&row.to_string());
                body.push('\n');
            }
            body.push('\n');
            ResponseTemplate::new(200).set_body_raw(body, "application/json")
        } else {
            ResponseTemplate::new(200).set_body_json(json!({
                "results": delivered,
                "last_seq": last_seq,
                "pending": pending,
            }))
        }
    }
}

struct Info {
    state: Arc<Mutex<SimState>>,
    database: String,
}

impl Respond for Info {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let state = self.state.lock();
        ResponseTemplate::new(200).set_body_json(json!({
            "db_name": self.database,
            "doc_count": state.docs.len(),
            "update_seq": state.seq,
        }))
    }
}
