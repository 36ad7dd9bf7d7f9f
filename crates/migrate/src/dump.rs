#![forbid(unsafe_code)]

use np_storage::{EntityStore, StoreError, StoreSnapshot};
use serde_json::{Value, json};

pub(crate) fn print_store(store: &EntityStore) -> Result<(), StoreError> {
    let snapshot = store.snapshot()?;
    let rendered = render_snapshot(&snapshot);
    println!(
        "{}",
        serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| "{}".to_string())
    );
    Ok(())
}

pub(crate) fn render_snapshot(snapshot: &StoreSnapshot) -> Value {
    json!({
        "folders": snapshot
            .folders
            .iter()
            .map(|row| json!({ "id": row.id.as_i64(), "name": row.name, "parent": row.parent }))
            .collect::<Vec<_>>(),
        "notes": snapshot
            .notes
            .iter()
            .map(|row| json!({ "id": row.id.as_i64(), "title": row.title, "create_date": row.create_date }))
            .collect::<Vec<_>>(),
        "tags": snapshot
            .tags
            .iter()
            .map(|row| json!({ "id": row.id.as_i64(), "name": row.name }))
            .collect::<Vec<_>>(),
        "folder_notes": snapshot
            .folder_links
            .iter()
            .map(|row| json!({ "id": row.id, "folder_id": row.folder_id.as_i64(), "note_id": row.note_id.as_i64() }))
            .collect::<Vec<_>>(),
        "tag_notes": snapshot
            .tag_links
            .iter()
            .map(|row| json!({ "id": row.id, "tag_id": row.tag_id.as_i64(), "note_id": row.note_id.as_i64() }))
            .collect::<Vec<_>>(),
        "last_writes": snapshot
            .last_writes
            .iter()
            .map(|(table, at)| json!({ "table": table, "at": at }))
            .collect::<Vec<_>>(),
    })
}
