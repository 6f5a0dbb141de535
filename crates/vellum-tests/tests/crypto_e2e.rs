//! End-to-end encryption and path obfuscation.

use vellum_core::{FilePath, NoteKind};
use vellum_store::{EntryInfo, LiveStore, Settings, StoreError};
use vellum_tests::CouchSim;

fn info(size: u64) -> EntryInfo {
    EntryInfo {
        ctime: 1,
        mtime: 1,
        size,
    }
}

/// Deterministic pseudo-random printable text.
fn random_text(bytes: usize) -> String {
    let mut state = 0x2545F4914F6CDD1Du64;
    let mut text = String::with_capacity(bytes);
    while text.len() < bytes {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let c = (b' ' + ((state >> 33) % 95) as u8) as char;
        text.push(c);
    }
    text
}

#[tokio::test]
async fn test_encrypted_round_trip() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(Settings {
        passphrase: Some("p".to_string()),
        ..sim.settings()
    })
    .unwrap();
    let path = FilePath::new("big.md");
    let text = random_text(300 * 1024);

    store
        .put(&path, vec![text.clone()], info(text.len() as u64), NoteKind::Plain)
        .await
        .unwrap();

    let entry = store.get(&path, false).await.unwrap().unwrap();
    assert_eq!(entry.data, text);

    // Every leaf id carries the encrypted marker.
    let leaves = sim.leaf_ids();
    assert!(!leaves.is_empty());
    for id in &leaves {
        assert!(id.starts_with("h:+"), "unencrypted leaf id {id}");
    }

    // No leaf payload contains the plaintext.
    let probe = &text[..40];
    for id in &leaves {
        let data = sim.get_raw(id).unwrap()["data"].as_str().unwrap().to_string();
        assert!(!data.contains(probe));
    }
}

#[tokio::test]
async fn test_encrypted_read_through_fresh_store() {
    let sim = CouchSim::start("notes").await;
    let settings = Settings {
        passphrase: Some("p".to_string()),
        use_dynamic_iteration_count: true,
        ..sim.settings()
    };
    let writer = LiveStore::new(settings.clone()).unwrap();
    let path = FilePath::new("n.md");
    let text = "encrypted content that must survive a cold read".to_string();

    writer
        .put(&path, vec![text.clone()], info(text.len() as u64), NoteKind::NewNote)
        .await
        .unwrap();

    let reader = LiveStore::new(settings).unwrap();
    let entry = reader.get(&path, false).await.unwrap().unwrap();
    assert_eq!(entry.data, text);
}

#[tokio::test]
async fn test_wrong_passphrase_fails_to_decrypt() {
    let sim = CouchSim::start("notes").await;
    let path = FilePath::new("n.md");

    let writer = LiveStore::new(Settings {
        passphrase: Some("p".to_string()),
        ..sim.settings()
    })
    .unwrap();
    writer
        .put(&path, vec!["secret".to_string()], info(6), NoteKind::Plain)
        .await
        .unwrap();

    let reader = LiveStore::new(Settings {
        passphrase: Some("wrong".to_string()),
        ..sim.settings()
    })
    .unwrap();
    let err = reader.get(&path, false).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Decrypt(_) | StoreError::Integrity(_)
    ));
}

#[tokio::test]
async fn test_obfuscated_paths() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(Settings {
        obfuscate_passphrase: Some("o".to_string()),
        ..sim.settings()
    })
    .unwrap();
    let path = FilePath::new("secret/plan.md");

    store
        .put(&path, vec!["the plan".to_string()], info(8), NoteKind::Plain)
        .await
        .unwrap();

    // No document id or stored path leaks the name.
    for id in sim.doc_ids() {
        assert!(!id.contains("secret"), "id {id} leaks the path");
    }
    let meta_id = sim
        .doc_ids()
        .into_iter()
        .find(|id| id.starts_with("f:"))
        .expect("obfuscated metadata id");
    let raw = sim.get_raw(&meta_id).unwrap();
    assert_ne!(raw["path"], "secret/plan.md");

    // The original path still resolves.
    let entry = store.get(&path, false).await.unwrap().unwrap();
    assert_eq!(entry.path.as_str(), "secret/plan.md");
    assert_eq!(entry.data, "the plan");
}

#[tokio::test]
async fn test_obfuscation_and_encryption_together() {
    let sim = CouchSim::start("notes").await;
    let settings = Settings {
        passphrase: Some("p".to_string()),
        obfuscate_passphrase: Some("o".to_string()),
        ..sim.settings()
    };
    let store = LiveStore::new(settings).unwrap();
    let path = FilePath::new("vault/keys.md");

    store
        .put(&path, vec!["both layers".to_string()], info(11), NoteKind::NewNote)
        .await
        .unwrap();

    for id in sim.doc_ids() {
        assert!(!id.contains("vault"));
        if id.starts_with("h:") {
            assert!(id.starts_with("h:+"));
        }
    }
    let entry = store.get(&path, false).await.unwrap().unwrap();
    assert_eq!(entry.data, "both layers");
    assert_eq!(entry.path.as_str(), "vault/keys.md");
}

#[tokio::test]
async fn test_delete_keeps_obfuscated_path_opaque() {
    let sim = CouchSim::start("notes").await;
    let store = LiveStore::new(Settings {
        obfuscate_passphrase: Some("o".to_string()),
        ..sim.settings()
    })
    .unwrap();
    let path = FilePath::new("secret/gone.md");

    store
        .put(&path, vec!["x".to_string()], info(1), NoteKind::Plain)
        .await
        .unwrap();
    store.delete(&path).await.unwrap();

    for id in sim.doc_ids() {
        assert!(!id.contains("secret"));
    }
    let entry = store.get(&path, false).await.unwrap().unwrap();
    assert!(entry.deleted);
    assert_eq!(entry.path.as_str(), "secret/gone.md");
}
