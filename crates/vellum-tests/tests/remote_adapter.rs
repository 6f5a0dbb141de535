//! Adapter-level behavior against the simulator and raw mock servers.

use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use vellum_core::docs::{EntryDoc, LeafDoc, NoteDoc};
use vellum_core::{DocumentId, FilePath, NoteKind};
use vellum_remote::{CouchClient, RemoteConfig, RemoteError};
use vellum_store::{EntryInfo, LiveStore, Settings, StoreError};
use vellum_tests::CouchSim;

fn client_for(url: &str) -> CouchClient {
    CouchClient::new(&RemoteConfig {
        url: url.to_string(),
        username: "tester".to_string(),
        password: "secret".to_string(),
        database: "notes".to_string(),
    })
    .unwrap()
}

fn note(id: &str, rev: Option<&str>) -> EntryDoc {
    EntryDoc::Plain(NoteDoc {
        id: DocumentId::new(id),
        rev: rev.map(str::to_string),
        path: id.to_string(),
        children: vec![],
        ctime: 1,
        mtime: 1,
        size: 0,
        deleted: false,
    })
}

#[tokio::test]
async fn test_get_doc_absent_is_none() {
    let sim = CouchSim::start("notes").await;
    let client = client_for(&sim.url());
    let doc = client.get_doc(&DocumentId::new("missing.md")).await.unwrap();
    assert!(doc.is_none());
}

#[tokio::test]
async fn test_put_doc_roundtrip_and_rev() {
    let sim = CouchSim::start("notes").await;
    let client = client_for(&sim.url());

    let result = client.put_doc(&note("n.md", None)).await.unwrap();
    assert_eq!(result.id, "n.md");
    assert!(result.rev.starts_with("1-"));

    let fetched = client.get_doc(&DocumentId::new("n.md")).await.unwrap().unwrap();
    assert_eq!(fetched["_rev"], json!(result.rev));

    let updated = client
        .put_doc(&note("n.md", Some(&result.rev)))
        .await
        .unwrap();
    assert!(updated.rev.starts_with("2-"));
}

#[tokio::test]
async fn test_put_doc_stale_rev_is_conflict() {
    let sim = CouchSim::start("notes").await;
    let client = client_for(&sim.url());

    client.put_doc(&note("n.md", None)).await.unwrap();

    // Missing revision on an existing document.
    let err = client.put_doc(&note("n.md", None)).await.unwrap_err();
    assert!(matches!(err, RemoteError::Conflict));

    // Stale revision.
    let err = client
        .put_doc(&note("n.md", Some("1-0000000000000000")))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Conflict));
}

#[tokio::test]
async fn test_store_surfaces_metadata_conflict() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();
    let path = FilePath::new("raced.md");

    store
        .put(
            &path,
            vec!["mine".to_string()],
            EntryInfo {
                ctime: 1,
                mtime: 1,
                size: 4,
            },
            NoteKind::Plain,
        )
        .await
        .unwrap();

    // Another client bumps the metadata revision behind our back; writing
    // with the revision we fetched earlier must conflict at the adapter.
    let stale = sim.get_raw("raced.md").unwrap();
    sim.insert_raw("raced.md", stale.clone());

    let client = client_for(&sim.url());
    let mut doc: NoteDoc = match serde_json::from_value::<EntryDoc>(stale).unwrap() {
        EntryDoc::Plain(n) | EntryDoc::NewNote(n) => n,
        EntryDoc::Leaf(_) => unreachable!(),
    };
    doc.mtime = 99;
    let err = client.put_doc(&EntryDoc::Plain(doc)).await.unwrap_err();
    assert!(matches!(err, RemoteError::Conflict));
    assert!(matches!(StoreError::from(err), StoreError::Conflict));
}

#[tokio::test]
async fn test_bulk_docs_conflict_rows() {
    let sim = CouchSim::start("notes").await;
    let client = client_for(&sim.url());

    let leaf = EntryDoc::Leaf(LeafDoc {
        id: DocumentId::new("h:abc"),
        rev: None,
        data: "piece".to_string(),
    });
    let first = client.bulk_docs(std::slice::from_ref(&leaf)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(first[0].accepted());

    // Re-uploading the same content-addressed leaf conflicts benignly.
    let second = client.bulk_docs(&[leaf]).await.unwrap();
    assert!(!second[0].accepted());
    assert!(second[0].is_conflict());
}

#[tokio::test]
async fn test_all_docs_existence_probe() {
    let sim = CouchSim::start("notes").await;
    let client = client_for(&sim.url());

    sim.insert_raw("h:present", json!({"type": "leaf", "data": "x"}));

    let rows = client
        .all_docs_keys(
            &[DocumentId::new("h:present"), DocumentId::new("h:absent")],
            false,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].exists());
    assert!(!rows[1].exists());
    assert!(rows[0].doc.is_none());
}

#[tokio::test]
async fn test_auth_failure_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized", "reason": "bad credentials"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let err = client.db_info().await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth { status: 401 }));

    let store = LiveStore::new(Settings {
        url: server.uri(),
        database: "notes".to_string(),
        ..Settings::default()
    })
    .unwrap();
    let err = store.get(&FilePath::new("a.md"), true).await.unwrap_err();
    assert!(matches!(err, StoreError::Auth { status: 401 }));
}

#[tokio::test]
async fn test_server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal meltdown"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let err = client.db_info().await.unwrap_err();
    match err {
        RemoteError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("meltdown"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_db_info_probe() {
    let sim = CouchSim::start("notes").await;
    let client = client_for(&sim.url());

    let info = client.db_info().await.unwrap();
    assert_eq!(info.db_name, "notes");
    assert_eq!(info.doc_count, 0);

    sim.insert_raw("a.md", json!({"type": "plain", "path": "a.md", "children": [], "ctime": 0, "mtime": 0, "size": 0}));
    let info = client.db_info().await.unwrap();
    assert_eq!(info.doc_count, 1);
}

#[tokio::test]
async fn test_changes_page_shape() {
    let sim = CouchSim::start("notes").await;
    let client = client_for(&sim.url());

    sim.insert_raw("a.md", json!({"type": "plain", "path": "a.md", "children": [], "ctime": 0, "mtime": 0, "size": 0}));
    sim.insert_raw("b.md", json!({"type": "plain", "path": "b.md", "children": [], "ctime": 0, "mtime": 0, "size": 0}));

    let page = client.changes_page("0", 1).await.unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.pending, 1);

    let page = client.changes_page(&page.last_seq, 25).await.unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.pending, 0);
    assert!(page.results[0].doc.is_some());
}
