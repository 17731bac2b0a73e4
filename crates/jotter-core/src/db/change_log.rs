//! Change log of local mutations awaiting remote confirmation

use crate::error::Result;
use crate::models::{ChangeLogEntry, NewChange, NoteId};
use crate::util::unix_millis_now;
use rusqlite::types::Type;
use rusqlite::{params, Connection};

const ENTRY_COLUMNS: &str = "local_seq, note_id, operation, payload, version, attempts, created_at";

/// Trait for the append-only change log
pub trait ChangeLog {
    /// Append an entry and return its `local_seq`
    fn append(&self, change: &NewChange) -> Result<i64>;

    /// All pending entries, ascending by `local_seq`
    fn pending(&self) -> Result<Vec<ChangeLogEntry>>;

    /// Pending entries for one note, ascending by `local_seq`
    fn pending_for(&self, note_id: &NoteId) -> Result<Vec<ChangeLogEntry>>;

    /// Whether any entry for the note is still pending
    fn has_pending(&self, note_id: &NoteId) -> Result<bool>;

    /// Remove an acknowledged entry; returns whether it existed
    fn ack(&self, local_seq: i64) -> Result<bool>;

    /// Record a failed attempt; returns the new attempt count (0 if the entry is gone)
    fn bump(&self, local_seq: i64) -> Result<u32>;

    /// Number of pending entries
    fn count(&self) -> Result<usize>;
}

/// `SQLite` implementation of `ChangeLog`
pub struct SqliteChangeLog<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteChangeLog<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
        let note_id: String = row.get(1)?;
        let operation: String = row.get(2)?;
        let payload: String = row.get(3)?;

        Ok(ChangeLogEntry {
            local_seq: row.get(0)?,
            note_id: note_id.parse().map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(error))
            })?,
            operation: operation.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, error.into())
            })?,
            payload: serde_json::from_str(&payload).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(error))
            })?,
            version: row.get(4)?,
            attempts: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl ChangeLog for SqliteChangeLog<'_> {
    fn append(&self, change: &NewChange) -> Result<i64> {
        let payload = serde_json::to_string(&change.payload)?;
        self.conn.execute(
            "INSERT INTO change_log (note_id, operation, payload, version, attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                change.note_id.as_str(),
                change.operation.as_str(),
                payload,
                change.version,
                unix_millis_now()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn pending(&self) -> Result<Vec<ChangeLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM change_log ORDER BY local_seq ASC"
        ))?;
        let entries = stmt
            .query_map([], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn pending_for(&self, note_id: &NoteId) -> Result<Vec<ChangeLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM change_log WHERE note_id = ?1 ORDER BY local_seq ASC"
        ))?;
        let entries = stmt
            .query_map(params![note_id.as_str()], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn has_pending(&self, note_id: &NoteId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM change_log WHERE note_id = ?1)",
            params![note_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn ack(&self, local_seq: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM change_log WHERE local_seq = ?1",
            params![local_seq],
        )?;
        Ok(rows > 0)
    }

    fn bump(&self, local_seq: i64) -> Result<u32> {
        let mut stmt = self.conn.prepare(
            "UPDATE change_log SET attempts = attempts + 1 WHERE local_seq = ?1 RETURNING attempts",
        )?;
        let mut rows = stmt.query(params![local_seq])?;
        let attempts = match rows.next()? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(attempts)
    }

    fn count(&self) -> Result<usize> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM change_log", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NoteStore, SqliteNoteStore};
    use crate::models::{ChangeOperation, Note, NotePatch};
    use pretty_assertions::assert_eq;

    fn setup_with_note() -> (Database, Note) {
        let db = Database::open_in_memory().unwrap();
        let note = Note::new("Groceries", "Milk");
        SqliteNoteStore::new(db.connection()).put(&note).unwrap();
        (db, note)
    }

    fn create_change(note: &Note) -> NewChange {
        NewChange::new(
            note.id,
            ChangeOperation::Create,
            NotePatch::full(note),
            note.version,
        )
    }

    #[test]
    fn test_append_assigns_increasing_seq() {
        let (db, note) = setup_with_note();
        let log = SqliteChangeLog::new(db.connection());

        let first = log.append(&create_change(&note)).unwrap();
        let second = log
            .append(&NewChange::new(
                note.id,
                ChangeOperation::Update,
                NotePatch::default().content("Milk, Eggs"),
                2,
            ))
            .unwrap();
        assert!(second > first);

        let pending = log.pending().unwrap();
        assert_eq!(
            pending.iter().map(|e| e.local_seq).collect::<Vec<_>>(),
            vec![first, second]
        );
        assert_eq!(pending[1].payload.content.as_deref(), Some("Milk, Eggs"));
        assert_eq!(pending[1].operation, ChangeOperation::Update);
    }

    #[test]
    fn test_seq_not_reused_after_ack() {
        let (db, note) = setup_with_note();
        let log = SqliteChangeLog::new(db.connection());

        let first = log.append(&create_change(&note)).unwrap();
        assert!(log.ack(first).unwrap());
        let second = log.append(&create_change(&note)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_append_requires_existing_note() {
        let db = Database::open_in_memory().unwrap();
        let log = SqliteChangeLog::new(db.connection());

        let orphan = Note::new("never stored", "");
        assert!(log.append(&create_change(&orphan)).is_err());
        assert_eq!(log.count().unwrap(), 0);
    }

    #[test]
    fn test_bump_counts_attempts() {
        let (db, note) = setup_with_note();
        let log = SqliteChangeLog::new(db.connection());

        let seq = log.append(&create_change(&note)).unwrap();
        assert_eq!(log.bump(seq).unwrap(), 1);
        assert_eq!(log.bump(seq).unwrap(), 2);
        assert_eq!(log.pending().unwrap()[0].attempts, 2);

        log.ack(seq).unwrap();
        assert_eq!(log.bump(seq).unwrap(), 0);
    }

    #[test]
    fn test_pending_for_filters_by_note() {
        let (db, note) = setup_with_note();
        let other = Note::new("Other", "");
        SqliteNoteStore::new(db.connection()).put(&other).unwrap();
        let log = SqliteChangeLog::new(db.connection());

        log.append(&create_change(&note)).unwrap();
        log.append(&create_change(&other)).unwrap();

        assert_eq!(log.pending_for(&note.id).unwrap().len(), 1);
        assert!(log.has_pending(&other.id).unwrap());
        assert!(!log.has_pending(&NoteId::new()).unwrap());
        assert_eq!(log.count().unwrap(), 2);
    }
}
