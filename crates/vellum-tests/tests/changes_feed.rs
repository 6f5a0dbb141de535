//! Change-feed readers: paged drain and continuous watch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use vellum_core::{FilePath, NoteKind};
use vellum_store::{EntryInfo, FileEntry, LiveStore, WatchState};
use vellum_tests::CouchSim;

fn info(size: u64) -> EntryInfo {
    EntryInfo {
        ctime: 1,
        mtime: 1,
        size,
    }
}

async fn put(store: &LiveStore, path: &str, text: &str) {
    store
        .put(
            &FilePath::new(path),
            vec![text.to_string()],
            info(text.len() as u64),
            NoteKind::Plain,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_follow_updates_delivers_notes_in_seq_order() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();

    put(&store, "a.md", "first note").await;
    put(&store, "b.md", "second note").await;

    let mut delivered: Vec<(String, String)> = Vec::new();
    let since = store
        .follow_updates(|entry, seq| delivered.push((entry.path.as_str().to_string(), seq)))
        .await
        .unwrap();

    // Leaves flow through the feed too but only notes are delivered.
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].0, "a.md");
    assert_eq!(delivered[1].0, "b.md");

    // Seq tokens are monotonically non-decreasing, and the returned cursor
    // is the maximum processed.
    let seqs: Vec<u64> = delivered.iter().map(|(_, s)| s.parse().unwrap()).collect();
    assert!(seqs.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(since.parse::<u64>().unwrap(), sim.last_seq());
}

#[tokio::test]
async fn test_follow_updates_resumes_from_cursor() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();

    put(&store, "a.md", "first").await;
    put(&store, "b.md", "second").await;

    let mut first_batch = Vec::new();
    let cursor = store
        .follow_updates(|entry, _| first_batch.push(entry.path.as_str().to_string()))
        .await
        .unwrap();
    assert_eq!(first_batch.len(), 2);

    put(&store, "c.md", "third").await;
    put(&store, "d.md", "fourth").await;

    // Resume from the recorded cursor: exactly the two new notes arrive.
    let resumed = LiveStore::new(sim.settings()).unwrap();
    resumed.set_since(cursor);
    let mut second_batch = Vec::new();
    resumed
        .follow_updates(|entry, _| second_batch.push(entry.path.as_str().to_string()))
        .await
        .unwrap();
    assert_eq!(second_batch, vec!["c.md".to_string(), "d.md".to_string()]);
}

#[tokio::test]
async fn test_follow_updates_pages_through_backlog() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();

    // More notes than one 25-row page can carry.
    for i in 0..40 {
        put(&store, &format!("note-{i:03}.md"), "content").await;
    }

    let mut delivered = 0usize;
    store.follow_updates(|_, _| delivered += 1).await.unwrap();
    assert_eq!(delivered, 40);
}

#[tokio::test]
async fn test_follow_updates_delivers_tombstones() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();

    put(&store, "gone.md", "short lived").await;
    store.delete(&FilePath::new("gone.md")).await.unwrap();

    let mut latest: Option<FileEntry> = None;
    store
        .follow_updates(|entry, _| {
            if entry.path.as_str() == "gone.md" {
                latest = Some(entry);
            }
        })
        .await
        .unwrap();

    let entry = latest.expect("tombstone delivered");
    assert!(entry.deleted);
    assert_eq!(entry.size, 0);
}

#[tokio::test]
async fn test_follow_updates_skips_broken_docs() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();

    put(&store, "good-a.md", "fine").await;
    sim.insert_raw(
        "broken.md",
        serde_json::json!({
            "type": "plain", "path": "broken.md",
            "children": ["h:missing"], "ctime": 1, "mtime": 1, "size": 4
        }),
    );
    put(&store, "good-b.md", "also fine").await;

    let mut delivered = Vec::new();
    store
        .follow_updates(|entry, _| delivered.push(entry.path.as_str().to_string()))
        .await
        .unwrap();

    // The broken document is logged and skipped, not fatal.
    assert!(delivered.contains(&"good-a.md".to_string()));
    assert!(delivered.contains(&"good-b.md".to_string()));
    assert!(!delivered.contains(&"broken.md".to_string()));
}

#[tokio::test]
async fn test_begin_watch_delivers_and_stops() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();

    put(&store, "w1.md", "watched one").await;
    put(&store, "w2.md", "watched two").await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = store.begin_watch(move |entry, seq| {
        let _ = tx.send((entry.path.as_str().to_string(), seq));
    });

    let mut seen = Vec::new();
    for _ in 0..2 {
        let received = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("watcher delivered within the timeout")
            .expect("channel open");
        seen.push(received);
    }
    assert_eq!(seen[0].0, "w1.md");
    assert_eq!(seen[1].0, "w2.md");
    let seqs: Vec<u64> = seen.iter().map(|(_, s)| s.parse().unwrap()).collect();
    assert!(seqs.windows(2).all(|w| w[0] <= w[1]));

    handle.stop().await;

    // The cursor advanced past everything delivered.
    assert!(store.since().parse::<u64>().unwrap() >= seqs[1]);
}

#[tokio::test]
async fn test_stopped_watcher_reports_state_and_reconnects_no_more() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();
    put(&store, "x.md", "content").await;

    let seen = Arc::new(Mutex::new(0usize));
    let seen_cb = seen.clone();
    let handle = store.begin_watch(move |_, _| {
        *seen_cb.lock().unwrap() += 1;
    });

    // Wait for the first delivery, then stop.
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if *seen.lock().unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("watcher delivered");

    handle.stop().await;
    let count_at_stop = *seen.lock().unwrap();

    // New writes after stop are not delivered.
    put(&store, "y.md", "late").await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(*seen.lock().unwrap(), count_at_stop);
}

#[tokio::test]
async fn test_watch_state_reaches_stopped() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(sim.settings()).unwrap();

    let handle = store.begin_watch(|_, _| {});
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_ne!(handle.state(), WatchState::Stopped);

    let terminal = handle.stop().await;
    assert_eq!(terminal, WatchState::Stopped);
}
