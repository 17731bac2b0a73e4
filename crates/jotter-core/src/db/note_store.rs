//! Local note store implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{Note, NoteId, SyncConflict};
use crate::util::unix_millis_now;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

const NOTE_COLUMNS: &str =
    "id, title, content, picture, created_at, updated_at, version, is_deleted";

/// Whether a versioned write reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Applied,
    /// The stored version was newer; nothing changed
    Stale,
}

impl PutOutcome {
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Trait for durable note storage operations
pub trait NoteStore {
    /// Get a note by ID, including tombstones
    fn get(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Upsert a note; overwrites only if the incoming version is >= the stored one
    fn put(&self, note: &Note) -> Result<PutOutcome>;

    /// Upsert a note; overwrites only if the incoming version is strictly newer
    fn put_newer(&self, note: &Note) -> Result<PutOutcome>;

    /// Overwrite a note regardless of version (server-wins resolution only)
    fn replace(&self, note: &Note) -> Result<()>;

    /// List live notes, newest first by creation time
    fn list(&self) -> Result<Vec<Note>>;

    /// Purge a note record; returns whether a row was removed
    fn remove(&self, id: &NoteId) -> Result<bool>;

    /// All stored ids, tombstones included
    fn all_ids(&self) -> Result<Vec<NoteId>>;

    /// Live note ids starting with `prefix`
    fn ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Read a sync metadata value
    fn meta_get(&self, key: &str) -> Result<Option<String>>;

    /// Write a sync metadata value
    fn meta_set(&self, key: &str, value: &str) -> Result<()>;

    /// Journal a server-wins resolution
    fn record_conflict(&self, note_id: &NoteId, local_version: i64, remote_version: i64)
        -> Result<()>;

    /// Most recent resolved conflicts first
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `NoteStore`
pub struct SqliteNoteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteNoteStore<'a> {
    /// Create a new store over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a note from a database row
    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
        let id: String = row.get(0)?;
        let id = id
            .parse()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error)))?;
        Ok(Note {
            id,
            title: row.get(1)?,
            content: row.get(2)?,
            picture: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            version: row.get(6)?,
            deleted: row.get(7)?,
        })
    }

    fn upsert(&self, note: &Note, guard: &str) -> Result<PutOutcome> {
        let sql = format!(
            "INSERT INTO notes ({NOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                picture = excluded.picture,
                updated_at = excluded.updated_at,
                version = excluded.version,
                is_deleted = excluded.is_deleted
             WHERE {guard}"
        );
        let rows = self.conn.execute(
            &sql,
            params![
                note.id.as_str(),
                note.title,
                note.content,
                note.picture,
                note.created_at,
                note.updated_at,
                note.version,
                note.deleted
            ],
        )?;

        Ok(if rows == 0 {
            PutOutcome::Stale
        } else {
            PutOutcome::Applied
        })
    }
}

impl NoteStore for SqliteNoteStore<'_> {
    fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![id.as_str()],
                Self::parse_note,
            )
            .optional()?;
        Ok(note)
    }

    fn put(&self, note: &Note) -> Result<PutOutcome> {
        self.upsert(note, "excluded.version >= notes.version")
    }

    fn put_newer(&self, note: &Note) -> Result<PutOutcome> {
        self.upsert(note, "excluded.version > notes.version")
    }

    fn replace(&self, note: &Note) -> Result<()> {
        self.upsert(note, "1")?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS}
             FROM notes
             WHERE is_deleted = 0
             ORDER BY created_at DESC, id DESC"
        ))?;

        let notes = stmt
            .query_map([], Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes)
    }

    fn remove(&self, id: &NoteId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn all_ids(&self) -> Result<Vec<NoteId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM notes")?;
        let ids = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                id.parse::<NoteId>().map_err(|error| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error))
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', ""));
        let mut stmt = self.conn.prepare(
            "SELECT id FROM notes
             WHERE id LIKE ?1 AND is_deleted = 0
             ORDER BY id
             LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![pattern, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM sync_meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }

    fn record_conflict(
        &self,
        note_id: &NoteId,
        local_version: i64,
        remote_version: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_conflicts (note_id, local_version, remote_version, resolved_at, strategy)
             VALUES (?1, ?2, ?3, ?4, 'server-wins')",
            params![note_id.as_str(), local_version, remote_version, unix_millis_now()],
        )?;
        Ok(())
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, note_id, local_version, remote_version, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?1",
        )?;
        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncConflict {
                    id: row.get(0)?,
                    note_id: row.get(1)?,
                    local_version: row.get(2)?,
                    remote_version: row.get(3)?,
                    resolved_at: row.get(4)?,
                    strategy: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let note = Note::new("Groceries", "Milk");
        assert_eq!(store.put(&note).unwrap(), PutOutcome::Applied);

        let fetched = store.get(&note.id).unwrap().unwrap();
        assert_eq!(fetched, note);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());
        assert!(store.get(&NoteId::new()).unwrap().is_none());
    }

    #[test]
    fn test_put_discards_older_version() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let mut note = Note::new("Title", "v1");
        note.version = 3;
        store.put(&note).unwrap();

        let mut older = note.clone();
        older.version = 2;
        older.content = "stale".to_string();
        assert_eq!(store.put(&older).unwrap(), PutOutcome::Stale);
        assert_eq!(store.get(&note.id).unwrap().unwrap().content, "v1");

        let mut same = note.clone();
        same.content = "same version".to_string();
        assert_eq!(store.put(&same).unwrap(), PutOutcome::Applied);
        assert_eq!(store.put_newer(&same).unwrap(), PutOutcome::Stale);
    }

    #[test]
    fn test_put_keeps_created_at() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let note = Note::new("Title", "body");
        store.put(&note).unwrap();

        let mut newer = note.clone();
        newer.version = 2;
        newer.created_at = 1;
        store.put(&newer).unwrap();
        assert_eq!(
            store.get(&note.id).unwrap().unwrap().created_at,
            note.created_at
        );
    }

    #[test]
    fn test_replace_ignores_version() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let mut note = Note::new("Title", "local");
        note.version = 6;
        store.put(&note).unwrap();

        let mut server = note.clone();
        server.version = 5;
        server.content = "server".to_string();
        store.replace(&server).unwrap();

        let stored = store.get(&note.id).unwrap().unwrap();
        assert_eq!(stored.version, 5);
        assert_eq!(stored.content, "server");
    }

    #[test]
    fn test_list_excludes_tombstones_newest_first() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let mut first = Note::new("first", "");
        first.created_at = 100;
        let mut second = Note::new("second", "");
        second.created_at = 200;
        let mut gone = Note::new("gone", "");
        gone.created_at = 300;
        gone.deleted = true;

        for note in [&first, &second, &gone] {
            store.put(note).unwrap();
        }

        let titles: Vec<String> = store.list().unwrap().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["second".to_string(), "first".to_string()]);
        assert_eq!(store.all_ids().unwrap().len(), 3);
    }

    #[test]
    fn test_remove() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let note = Note::new("To purge", "");
        store.put(&note).unwrap();
        assert!(store.remove(&note.id).unwrap());
        assert!(!store.remove(&note.id).unwrap());
        assert!(store.get(&note.id).unwrap().is_none());
    }

    #[test]
    fn test_ids_by_prefix() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let note = Note::new("Prefix", "");
        store.put(&note).unwrap();
        let id = note.id.to_string();

        let matches = store.ids_by_prefix(&id[..8], 3).unwrap();
        assert_eq!(matches, vec![id]);
        assert!(store.ids_by_prefix("zzzz", 3).unwrap().is_empty());
    }

    #[test]
    fn test_meta_round_trip() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        assert_eq!(store.meta_get("last_pull_at").unwrap(), None);
        store.meta_set("last_pull_at", "42").unwrap();
        store.meta_set("last_pull_at", "43").unwrap();
        assert_eq!(store.meta_get("last_pull_at").unwrap().as_deref(), Some("43"));
    }

    #[test]
    fn test_conflict_journal() {
        let db = setup();
        let store = SqliteNoteStore::new(db.connection());

        let id = NoteId::new();
        store.record_conflict(&id, 5, 5).unwrap();

        let conflicts = store.list_conflicts(10).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].note_id, id.to_string());
        assert_eq!(conflicts[0].strategy, "server-wins");
    }
}
