#![forbid(unsafe_code)]

use np_core::ids::{FolderId, NoteId, TagId};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const DB_FILE: &str = "noteporter.db";

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Integrity { table: &'static str, key: String },
    WriteFailure { table: &'static str },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Integrity { table, key } => {
                write!(f, "integrity violation: {table} holds multiple rows for unique key {key}")
            }
            Self::WriteFailure { table } => {
                write!(f, "write failure: {table} mutation did not affect exactly one row")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

/// The five entity/association tables plus the write ledger's own name.
/// Downstream patch/audit utilities read these by name, so the strings
/// are part of the on-disk contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    Folders,
    Notes,
    Tags,
    FolderNotes,
    TagNotes,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Folders => "Folders",
            Table::Notes => "Notes",
            Table::Tags => "Tags",
            Table::FolderNotes => "Folder2Notes",
            Table::TagNotes => "Tag2Notes",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FolderRow {
    pub id: FolderId,
    pub name: String,
    pub parent: String,
}

#[derive(Clone, Debug)]
pub struct NoteRow {
    pub id: NoteId,
    pub title: String,
    pub create_date: String,
}

#[derive(Clone, Debug)]
pub struct TagRow {
    pub id: TagId,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct FolderLinkRow {
    pub id: i64,
    pub folder_id: FolderId,
    pub note_id: NoteId,
}

#[derive(Clone, Debug)]
pub struct TagLinkRow {
    pub id: i64,
    pub tag_id: TagId,
    pub note_id: NoteId,
}

#[derive(Clone, Debug, Default)]
pub struct StoreSnapshot {
    pub folders: Vec<FolderRow>,
    pub notes: Vec<NoteRow>,
    pub tags: Vec<TagRow>,
    pub folder_links: Vec<FolderLinkRow>,
    pub tag_links: Vec<TagLinkRow>,
    pub last_writes: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct EntityStore {
    storage_dir: PathBuf,
    conn: Connection,
}

impl EntityStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        install_schema(&conn)?;

        Ok(Self { storage_dir, conn })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn find_folder(&self, name: &str, parent: &str) -> Result<Option<FolderRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT fID, fName, fParent FROM Folders WHERE fName = ?1 AND fParent = ?2",
        )?;
        let rows = stmt
            .query_map(params![name, parent], folder_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        unique_match(rows, Table::Folders, || format!("(name={name}, parent={parent})"))
    }

    pub fn insert_folder(&mut self, name: &str, parent: &str) -> Result<FolderRow, StoreError> {
        let changed = self.conn.execute(
            "INSERT INTO Folders(fName, fParent) VALUES (?1, ?2)",
            params![name, parent],
        )?;
        if changed != 1 {
            return Err(StoreError::WriteFailure { table: Table::Folders.as_str() });
        }
        Ok(FolderRow {
            id: FolderId::new(self.conn.last_insert_rowid()),
            name: name.to_string(),
            parent: parent.to_string(),
        })
    }

    pub fn find_notes_by_title(&self, title: &str) -> Result<Vec<NoteRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT nID, nTitle, nCreateDate FROM Notes WHERE nTitle = ?1 ORDER BY nID ASC")?;
        let rows = stmt
            .query_map(params![title], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_note(&mut self, title: &str, create_date: &str) -> Result<NoteRow, StoreError> {
        let changed = self.conn.execute(
            "INSERT INTO Notes(nTitle, nCreateDate) VALUES (?1, ?2)",
            params![title, create_date],
        )?;
        if changed != 1 {
            return Err(StoreError::WriteFailure { table: Table::Notes.as_str() });
        }
        Ok(NoteRow {
            id: NoteId::new(self.conn.last_insert_rowid()),
            title: title.to_string(),
            create_date: create_date.to_string(),
        })
    }

    pub fn find_tag(&self, name: &str) -> Result<Option<TagRow>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT tID, tName FROM Tags WHERE tName = ?1")?;
        let rows = stmt
            .query_map(params![name], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        unique_match(rows, Table::Tags, || format!("(name={name})"))
    }

    pub fn insert_tag(&mut self, name: &str) -> Result<TagRow, StoreError> {
        let changed = self
            .conn
            .execute("INSERT INTO Tags(tName) VALUES (?1)", params![name])?;
        if changed != 1 {
            return Err(StoreError::WriteFailure { table: Table::Tags.as_str() });
        }
        Ok(TagRow {
            id: TagId::new(self.conn.last_insert_rowid()),
            name: name.to_string(),
        })
    }

    pub fn link_folder_note(&mut self, folder_id: FolderId, note_id: NoteId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "INSERT INTO Folder2Notes(fnFolderID, fnNoteID) VALUES (?1, ?2)",
            params![folder_id.as_i64(), note_id.as_i64()],
        )?;
        if changed != 1 {
            return Err(StoreError::WriteFailure { table: Table::FolderNotes.as_str() });
        }
        Ok(())
    }

    pub fn link_tag_note(&mut self, tag_id: TagId, note_id: NoteId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "INSERT INTO Tag2Notes(tnNoteID, tnTagID) VALUES (?1, ?2)",
            params![note_id.as_i64(), tag_id.as_i64()],
        )?;
        if changed != 1 {
            return Err(StoreError::WriteFailure { table: Table::TagNotes.as_str() });
        }
        Ok(())
    }

    /// Record "this table was written now" for outside auditing. Not
    /// consulted for correctness anywhere.
    pub fn touch(&mut self, table: Table) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO Utility(uKey, uValue) VALUES (?1, ?2)
            ON CONFLICT(uKey) DO UPDATE SET uValue = excluded.uValue
            "#,
            params![table.as_str(), now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let mut snapshot = StoreSnapshot::default();

        let mut stmt = self
            .conn
            .prepare("SELECT fID, fName, fParent FROM Folders ORDER BY fID ASC")?;
        snapshot.folders = stmt
            .query_map([], folder_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT nID, nTitle, nCreateDate FROM Notes ORDER BY nID ASC")?;
        snapshot.notes = stmt
            .query_map([], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare("SELECT tID, tName FROM Tags ORDER BY tID ASC")?;
        snapshot.tags = stmt
            .query_map([], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT fnID, fnFolderID, fnNoteID FROM Folder2Notes ORDER BY fnID ASC")?;
        snapshot.folder_links = stmt
            .query_map([], |row| {
                Ok(FolderLinkRow {
                    id: row.get(0)?,
                    folder_id: FolderId::new(row.get(1)?),
                    note_id: NoteId::new(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT tnID, tnTagID, tnNoteID FROM Tag2Notes ORDER BY tnID ASC")?;
        snapshot.tag_links = stmt
            .query_map([], |row| {
                Ok(TagLinkRow {
                    id: row.get(0)?,
                    tag_id: TagId::new(row.get(1)?),
                    note_id: NoteId::new(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT uKey, uValue FROM Utility ORDER BY uKey ASC")?;
        snapshot.last_writes = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshot)
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    // Deliberately no UNIQUE constraints on the dedup keys: a violated
    // invariant must surface as a diagnosable Integrity error at lookup
    // time, with the store left intact for post-mortem inspection.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS Folders (
          fID INTEGER PRIMARY KEY AUTOINCREMENT,
          fName TEXT NOT NULL,
          fParent TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS Notes (
          nID INTEGER PRIMARY KEY AUTOINCREMENT,
          nTitle TEXT NOT NULL,
          nCreateDate TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS Tags (
          tID INTEGER PRIMARY KEY AUTOINCREMENT,
          tName TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS Folder2Notes (
          fnID INTEGER PRIMARY KEY AUTOINCREMENT,
          fnFolderID INTEGER NOT NULL REFERENCES Folders(fID),
          fnNoteID INTEGER NOT NULL REFERENCES Notes(nID)
        );

        CREATE TABLE IF NOT EXISTS Tag2Notes (
          tnID INTEGER PRIMARY KEY AUTOINCREMENT,
          tnNoteID INTEGER NOT NULL REFERENCES Notes(nID),
          tnTagID INTEGER NOT NULL REFERENCES Tags(tID)
        );

        CREATE TABLE IF NOT EXISTS Utility (
          uKey TEXT PRIMARY KEY,
          uValue TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_folders_name_parent ON Folders(fName, fParent);
        CREATE INDEX IF NOT EXISTS idx_notes_title ON Notes(nTitle);
        CREATE INDEX IF NOT EXISTS idx_tags_name ON Tags(tName);
        "#,
    )?;
    Ok(())
}

fn folder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FolderRow> {
    Ok(FolderRow {
        id: FolderId::new(row.get(0)?),
        name: row.get(1)?,
        parent: row.get(2)?,
    })
}

fn note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: NoteId::new(row.get(0)?),
        title: row.get(1)?,
        create_date: row.get(2)?,
    })
}

fn tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagRow> {
    Ok(TagRow {
        id: TagId::new(row.get(0)?),
        name: row.get(1)?,
    })
}

fn unique_match<T>(
    mut rows: Vec<T>,
    table: Table,
    key: impl FnOnce() -> String,
) -> Result<Option<T>, StoreError> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(Some(rows.remove(0))),
        _ => Err(StoreError::Integrity { table: table.as_str(), key: key() }),
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
