#![forbid(unsafe_code)]

use np_storage::{EntityStore, StoreError};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("np_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn folder_lookup_with_duplicate_key_rows_is_fatal() {
    let dir = temp_dir("folder_lookup_with_duplicate_key_rows_is_fatal");
    let mut store = EntityStore::open(&dir).expect("open store");

    // The store has no UNIQUE constraint on (fName, fParent); seed the
    // broken state a prior buggy run could have left behind.
    store.insert_folder("X", "").expect("first row");
    store.insert_folder("X", "").expect("second row");

    let err = store.find_folder("X", "").expect_err("lookup must refuse to guess");
    match err {
        StoreError::Integrity { table, key } => {
            assert_eq!(table, "Folders");
            assert!(key.contains("X"), "key description names the offending value: {key}");
        }
        other => panic!("expected Integrity, got {other:?}"),
    }
}

#[test]
fn tag_lookup_with_duplicate_key_rows_is_fatal() {
    let dir = temp_dir("tag_lookup_with_duplicate_key_rows_is_fatal");
    let mut store = EntityStore::open(&dir).expect("open store");

    store.insert_tag("recipes").expect("first row");
    store.insert_tag("recipes").expect("second row");

    let err = store.find_tag("recipes").expect_err("lookup must refuse to guess");
    assert!(matches!(err, StoreError::Integrity { table: "Tags", .. }));
}

#[test]
fn duplicate_folder_rows_with_different_parents_stay_legal() {
    let dir = temp_dir("duplicate_folder_rows_with_different_parents_stay_legal");
    let mut store = EntityStore::open(&dir).expect("open store");

    store.insert_folder("X", "").expect("root");
    store.insert_folder("X", "Archive").expect("nested");

    // Neither key is ambiguous, so both lookups succeed.
    assert!(store.find_folder("X", "").expect("root lookup").is_some());
    assert!(store.find_folder("X", "Archive").expect("nested lookup").is_some());
}

#[test]
fn link_rejects_unknown_ids() {
    use np_core::ids::{NoteId, TagId};

    let dir = temp_dir("link_rejects_unknown_ids");
    let mut store = EntityStore::open(&dir).expect("open store");

    let err = store
        .link_tag_note(TagId::new(999), NoteId::new(999))
        .expect_err("foreign keys are enforced");
    assert!(matches!(err, StoreError::Sql(_)));
}
