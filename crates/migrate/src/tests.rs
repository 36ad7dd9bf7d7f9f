#![forbid(unsafe_code)]

use crate::bridge::{SummaryPayload, decode_payload, decode_reply};
use crate::parse_args_from;
use crate::reconcile::Reconciler;
use crate::report::Reporter;
use crate::surface::{ItemSurface, SurfaceError};
use crate::traverse::{SkipMatcher, StopReason, TraversalController, TraversalOutcome};
use np_core::model::{ItemDetail, ItemSummary};
use np_storage::{EntityStore, StoreError};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("np_migrate_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[derive(Clone)]
struct ScriptedItem {
    summary: ItemSummary,
    detail: Option<ItemDetail>,
    tags: Vec<String>,
}

/// In-memory stand-in for the automation helper. `advance` sticks on
/// the last item, which reproduces exactly how the real list signals
/// its end: the same summary triple comes back again.
struct ScriptedSurface {
    items: Vec<ScriptedItem>,
    cursor: usize,
}

impl ScriptedSurface {
    fn new(items: Vec<ScriptedItem>) -> Self {
        Self { items, cursor: 0 }
    }

    fn current(&self) -> Result<&ScriptedItem, SurfaceError> {
        self.items
            .get(self.cursor)
            .ok_or_else(|| SurfaceError::Read("empty list".to_string()))
    }
}

impl ItemSurface for ScriptedSurface {
    fn summary(&mut self) -> Result<ItemSummary, SurfaceError> {
        Ok(self.current()?.summary.clone())
    }

    fn detail(&mut self) -> Result<ItemDetail, SurfaceError> {
        self.current()?
            .detail
            .clone()
            .ok_or_else(|| SurfaceError::Read("info panel did not settle".to_string()))
    }

    fn tags(&mut self) -> Result<Vec<String>, SurfaceError> {
        Ok(self.current()?.tags.clone())
    }

    fn advance(&mut self) -> Result<(), SurfaceError> {
        if self.cursor + 1 < self.items.len() {
            self.cursor += 1;
        }
        Ok(())
    }
}

fn item(title: &str, folder: &str, parent: &str, tags: &[&str]) -> ScriptedItem {
    ScriptedItem {
        summary: ItemSummary {
            title: title.to_string(),
            modified: "6/1/2024 9:00:00 AM".to_string(),
            legacy_created: None,
        },
        detail: Some(ItemDetail {
            folder: folder.to_string(),
            parent_path: parent.to_string(),
            modified: "6/1/2024 9:00:00 AM".to_string(),
            created: "1/1/2020, 8:00:00 AM".to_string(),
        }),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn run_walk(
    store: &mut EntityStore,
    items: Vec<ScriptedItem>,
    skip: Option<&str>,
    max_items: usize,
) -> Result<TraversalOutcome, StoreError> {
    let reporter = Reporter::new(false);
    let reconciler = Reconciler::new(store, &reporter);
    TraversalController::new(ScriptedSurface::new(items), reconciler, &reporter, skip, max_items)
        .run()
}

#[test]
fn walk_processes_each_item_once_and_stops_on_repeat() {
    let dir = temp_dir("walk_processes_each_item_once_and_stops_on_repeat");
    let mut store = EntityStore::open(&dir).expect("open store");

    let items = vec![
        item("A", "Inbox", "", &[]),
        item("B", "Inbox", "", &[]),
        item("C", "Inbox", "", &[]),
    ];
    let outcome = run_walk(&mut store, items, None, 500).expect("walk");

    assert_eq!(outcome.stop, StopReason::RepeatDetected);
    assert_eq!(outcome.stats.visited, 3);
    assert_eq!(outcome.stats.processed, 3);
    assert_eq!(outcome.stats.failed, 0);

    let snapshot = store.snapshot().expect("snapshot");
    let titles = snapshot.notes.iter().map(|n| n.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["A", "B", "C"]);
    assert_eq!(snapshot.folder_links.len(), 3);
}

#[test]
fn skip_resumes_at_matching_title_without_earlier_writes() {
    let dir = temp_dir("skip_resumes_at_matching_title_without_earlier_writes");
    let mut store = EntityStore::open(&dir).expect("open store");

    let items = vec![
        item("A", "Inbox", "", &["old"]),
        item("B", "Inbox", "", &["old"]),
        item("C", "Inbox", "", &["new"]),
        item("D", "Inbox", "", &["new"]),
    ];
    let outcome = run_walk(&mut store, items, Some("c"), 500).expect("walk");

    assert_eq!(outcome.stop, StopReason::RepeatDetected);
    assert_eq!(outcome.stats.visited, 4);
    assert_eq!(outcome.stats.skipped, 2);
    assert_eq!(outcome.stats.processed, 2);

    let snapshot = store.snapshot().expect("snapshot");
    let titles = snapshot.notes.iter().map(|n| n.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["C", "D"], "skipped items leave no rows behind");
    let tags = snapshot.tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
    assert_eq!(tags, vec!["new"]);
}

#[test]
fn duplicate_titles_create_distinct_notes_with_one_warning() {
    let dir = temp_dir("duplicate_titles_create_distinct_notes_with_one_warning");
    let mut store = EntityStore::open(&dir).expect("open store");

    let first = item("Grilled Pizza", "Recipes", "", &[]);
    let mut second = item("Grilled Pizza", "Recipes", "Archive", &[]);
    // Distinct modified dates keep the triples apart; only the titles collide.
    second.summary.modified = "6/2/2024 9:00:00 AM".to_string();

    let outcome = run_walk(&mut store, vec![first, second], None, 500).expect("walk");

    assert_eq!(outcome.stats.processed, 2);
    assert_eq!(outcome.stats.duplicate_titles, 1);

    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.notes.len(), 2, "colliding titles are never merged");
    assert_ne!(snapshot.notes[0].id, snapshot.notes[1].id);
}

#[test]
fn shared_tag_reuses_one_row_across_notes() {
    let dir = temp_dir("shared_tag_reuses_one_row_across_notes");
    let mut store = EntityStore::open(&dir).expect("open store");

    let items = vec![
        item("A", "Inbox", "", &["Recipes"]),
        item("B", "Inbox", "", &["Recipes"]),
    ];
    run_walk(&mut store, items, None, 500).expect("walk");

    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.tags.len(), 1);
    assert_eq!(snapshot.tag_links.len(), 2);
    let tag_id = snapshot.tags[0].id;
    assert!(snapshot.tag_links.iter().all(|link| link.tag_id == tag_id));
}

#[test]
fn folder_identity_is_the_name_parent_pair() {
    let dir = temp_dir("folder_identity_is_the_name_parent_pair");
    let mut store = EntityStore::open(&dir).expect("open store");

    let items = vec![
        item("A", "X", "", &[]),
        item("B", "X", "Archive", &[]),
        item("C", "X", "", &[]),
    ];
    run_walk(&mut store, items, None, 500).expect("walk");

    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.folders.len(), 2, "same name under different parents stays split");
    assert_eq!(snapshot.folder_links.len(), 3);

    let root_id = snapshot
        .folders
        .iter()
        .find(|f| f.parent.is_empty())
        .expect("root folder")
        .id;
    let linked_to_root = snapshot
        .folder_links
        .iter()
        .filter(|link| link.folder_id == root_id)
        .count();
    assert_eq!(linked_to_root, 2, "A and C land in the same folder row");
}

#[test]
fn legacy_creation_date_wins_over_detail() {
    let dir = temp_dir("legacy_creation_date_wins_over_detail");
    let mut store = EntityStore::open(&dir).expect("open store");

    let mut with_legacy = item("A", "Inbox", "", &[]);
    with_legacy.summary.legacy_created = Some("3/29/2007 9:10:16 PM".to_string());
    let without_legacy = item("B", "Inbox", "", &[]);

    run_walk(&mut store, vec![with_legacy, without_legacy], None, 500).expect("walk");

    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.notes[0].create_date, "3/29/2007 9:10:16 PM");
    assert_eq!(
        snapshot.notes[1].create_date, "1/1/2020 8:00:00 AM",
        "detail date loses its comma on the way in"
    );
}

#[test]
fn failed_detail_read_abandons_item_without_writes() {
    let dir = temp_dir("failed_detail_read_abandons_item_without_writes");
    let mut store = EntityStore::open(&dir).expect("open store");

    let mut broken = item("A", "Inbox", "", &["tag"]);
    broken.detail = None;
    let items = vec![broken, item("B", "Inbox", "", &[])];

    let outcome = run_walk(&mut store, items, None, 500).expect("walk");
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.processed, 1);

    let snapshot = store.snapshot().expect("snapshot");
    let titles = snapshot.notes.iter().map(|n| n.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["B"], "no partial rows for the abandoned item");
    assert!(snapshot.tags.is_empty());
}

#[test]
fn broken_folder_invariant_aborts_the_run() {
    let dir = temp_dir("broken_folder_invariant_aborts_the_run");
    let mut store = EntityStore::open(&dir).expect("open store");

    // Pre-seed the corrupt state a prior buggy run could have left.
    store.insert_folder("X", "").expect("first seeded row");
    store.insert_folder("X", "").expect("second seeded row");

    let items = vec![item("A", "X", "", &["tag"])];
    let err = run_walk(&mut store, items, None, 500).expect_err("walk must abort");
    assert!(matches!(err, StoreError::Integrity { table: "Folders", .. }));

    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.folder_links.len(), 0, "no writes after the violation");
    assert!(snapshot.tags.is_empty(), "tag resolution never ran");
    assert_eq!(snapshot.notes.len(), 1, "the note insert preceding the violation stays");
}

#[test]
fn iteration_cap_is_a_soft_abort() {
    let dir = temp_dir("iteration_cap_is_a_soft_abort");
    let mut store = EntityStore::open(&dir).expect("open store");

    let items = vec![
        item("A", "Inbox", "", &[]),
        item("B", "Inbox", "", &[]),
        item("C", "Inbox", "", &[]),
        item("D", "Inbox", "", &[]),
    ];
    let outcome = run_walk(&mut store, items, None, 2).expect("walk");

    assert_eq!(outcome.stop, StopReason::CapExceeded);
    assert_eq!(outcome.stats.visited, 2);
    assert_eq!(outcome.stats.processed, 2);
}

#[test]
fn skip_matcher_is_case_insensitive_and_degrades_to_literal() {
    let regex = SkipMatcher::new("^grilled");
    assert!(regex.matches("Grilled Pizza"));
    assert!(!regex.matches("Not Grilled"));

    let substring = SkipMatcher::new("pizza");
    assert!(substring.matches("Grilled PIZZA night"));

    // An unbalanced paren is not a regex; the pattern still works as a
    // pasted-title literal.
    let literal = SkipMatcher::new("notes (draft");
    assert!(literal.matches("Old Notes (Draft 2)"));
    assert!(!literal.matches("Old Notes Draft"));
}

#[test]
fn bridge_reply_decoding_separates_protocol_from_read_failures() {
    let value = decode_reply("summary", r#"{"ok":true,"title":"A","modified":"6/1/2024"}"#)
        .expect("ok reply passes");
    let payload: SummaryPayload = decode_payload("summary", value).expect("payload decodes");
    assert_eq!(payload.title, "A");
    assert_eq!(payload.legacy_created, None);

    let err = decode_reply("detail", r#"{"ok":false,"error":"window vanished"}"#)
        .expect_err("helper failure surfaces");
    assert!(matches!(err, SurfaceError::Read(ref message) if message.contains("window vanished")));

    let err = decode_reply("tags", "not json").expect_err("garbage is a protocol error");
    assert!(matches!(err, SurfaceError::Protocol(_)));

    let err = decode_reply("advance", r#"{"title":"missing ok"}"#).expect_err("no ok flag");
    assert!(matches!(err, SurfaceError::Read(_)));
}

#[test]
fn bridge_summary_payload_keeps_legacy_date() {
    let value = decode_reply(
        "summary",
        r#"{"ok":true,"title":"A","modified":"6/1/2024","legacyCreated":"3/29/2007 9:10:16 PM"}"#,
    )
    .expect("reply");
    let payload: SummaryPayload = decode_payload("summary", value).expect("payload");
    assert_eq!(payload.legacy_created.as_deref(), Some("3/29/2007 9:10:16 PM"));
}

#[test]
fn args_parse_flags_and_equals_forms() {
    let raw = [
        "--storage-dir".to_string(),
        "/tmp/np".to_string(),
        "--skip=Grilled Pizza".to_string(),
        "--max-items".to_string(),
        "25".to_string(),
        "--dump".to_string(),
        "--debug".to_string(),
    ];
    let cfg = parse_args_from(&raw).expect("parse");
    assert_eq!(cfg.storage_dir, PathBuf::from("/tmp/np"));
    assert_eq!(cfg.skip.as_deref(), Some("Grilled Pizza"));
    assert_eq!(cfg.max_items, 25);
    assert!(cfg.dump);
    assert!(cfg.debug);
}

#[test]
fn args_reject_unknown_and_malformed_values() {
    let err = parse_args_from(&["--frobnicate".to_string()]).expect_err("unknown flag");
    assert!(err.contains("unknown argument"));

    let err = parse_args_from(&["--max-items".to_string(), "many".to_string()])
        .expect_err("non-numeric cap");
    assert!(err.contains("--max-items"));

    let err = parse_args_from(&["--skip".to_string()]).expect_err("missing value");
    assert!(err.contains("--skip requires"));

    let err = parse_args_from(&["--max-items".to_string(), "0".to_string()])
        .expect_err("zero cap makes no progress");
    assert!(err.contains("at least 1"));
}
