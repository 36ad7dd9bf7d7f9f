#![forbid(unsafe_code)]

use crate::report::Reporter;
use np_core::ids::{FolderId, NoteId, TagId};
use np_storage::{EntityStore, StoreError, Table};

pub(crate) struct NoteResolution {
    pub id: NoteId,
    /// Pre-existing note rows sharing the title. Non-empty means a
    /// duplicate-title warning was emitted for this item.
    pub collisions: Vec<NoteId>,
}

/// Maps freeform scraped strings onto stable row ids. The only writer
/// the store ever sees; lookups and inserts interleave with nothing,
/// so read-then-maybe-insert is race-free.
pub(crate) struct Reconciler<'a> {
    store: &'a mut EntityStore,
    reporter: &'a Reporter,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(store: &'a mut EntityStore, reporter: &'a Reporter) -> Self {
        Self { store, reporter }
    }

    /// Notes are never merged: the source service legally holds
    /// duplicate titles, and collapsing them would silently drop one
    /// note's metadata. Colliding rows are reported and kept.
    pub(crate) fn resolve_note(
        &mut self,
        title: &str,
        create_date: &str,
    ) -> Result<NoteResolution, StoreError> {
        let collisions = self
            .store
            .find_notes_by_title(title)?
            .into_iter()
            .map(|row| row.id)
            .collect::<Vec<_>>();

        let row = self.store.insert_note(title, create_date)?;
        self.store.touch(Table::Notes)?;

        if !collisions.is_empty() {
            let existing = collisions
                .iter()
                .map(|id| id.as_i64().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            self.reporter.warning(&format!(
                "duplicate note title {title:?}: new row {} joins existing row(s) {existing}",
                row.id.as_i64()
            ));
        }

        Ok(NoteResolution { id: row.id, collisions })
    }

    /// Folder identity is the (name, parent path) pair, never the name
    /// alone: same-named notebooks at different depths must not merge.
    pub(crate) fn resolve_folder(
        &mut self,
        name: &str,
        parent: &str,
        note_id: NoteId,
    ) -> Result<FolderId, StoreError> {
        let folder_id = match self.store.find_folder(name, parent)? {
            Some(row) => row.id,
            None => {
                let row = self.store.insert_folder(name, parent)?;
                self.store.touch(Table::Folders)?;
                row.id
            }
        };
        self.store.link_folder_note(folder_id, note_id)?;
        self.store.touch(Table::FolderNotes)?;
        Ok(folder_id)
    }

    pub(crate) fn resolve_tag(&mut self, name: &str, note_id: NoteId) -> Result<TagId, StoreError> {
        let tag_id = match self.store.find_tag(name)? {
            Some(row) => row.id,
            None => {
                let row = self.store.insert_tag(name)?;
                self.store.touch(Table::Tags)?;
                row.id
            }
        };
        self.store.link_tag_note(tag_id, note_id)?;
        self.store.touch(Table::TagNotes)?;
        Ok(tag_id)
    }
}
