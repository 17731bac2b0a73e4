//! Note service: the façade the presentation layer calls.

use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::auth::SessionProvider;
use crate::config::SyncSettings;
use crate::db::{ChangeLog, NoteStore, SharedDatabase, SqliteChangeLog, SqliteNoteStore};
use crate::events::{EventBus, NoteEvent};
use crate::models::{ChangeLogEntry, ChangeOperation, NewChange, Note, NoteId, NotePatch, SyncConflict};
use crate::remote::RemoteApi;
use crate::sync::{SyncEngine, SyncHandle, SyncTrigger, SyncWorker};
use crate::util::non_blank;
use crate::{Error, Result};

/// Optimistic note operations over the local store.
///
/// Every call completes against local state only: the note write and its
/// change-log entry commit together, then the sync worker is woken. Only
/// validation and not-found failures surface here.
#[derive(Clone)]
pub struct NoteService {
    db: SharedDatabase,
    events: EventBus,
    trigger: SyncTrigger,
}

impl NoteService {
    pub fn new(db: SharedDatabase) -> Self {
        Self::with_parts(db, EventBus::new(), SyncTrigger::new())
    }

    pub const fn with_parts(db: SharedDatabase, events: EventBus, trigger: SyncTrigger) -> Self {
        Self {
            db,
            events,
            trigger,
        }
    }

    pub const fn database(&self) -> &SharedDatabase {
        &self.db
    }

    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    pub const fn trigger(&self) -> &SyncTrigger {
        &self.trigger
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.events.subscribe()
    }

    /// Build a sync engine sharing this service's database and event stream.
    pub fn sync_engine(
        &self,
        remote: Arc<dyn RemoteApi>,
        session: Arc<dyn SessionProvider>,
        settings: SyncSettings,
    ) -> SyncEngine {
        SyncEngine::new(
            self.db.clone(),
            remote,
            session,
            settings,
            self.events.clone(),
        )
    }

    /// Start the background sync worker, woken by this service's mutations.
    pub fn spawn_sync(
        &self,
        remote: Arc<dyn RemoteApi>,
        session: Arc<dyn SessionProvider>,
        settings: SyncSettings,
    ) -> SyncHandle {
        let engine = self.sync_engine(remote, session, settings);
        SyncWorker::spawn(engine, self.trigger.clone())
    }

    pub fn create_note(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Note> {
        let note = Note::new(title, content);
        if note.is_blank() {
            return Err(Error::Validation(
                "a note needs a title or content".to_string(),
            ));
        }

        self.db.with_transaction(|conn| {
            SqliteNoteStore::new(conn).put(&note)?;
            SqliteChangeLog::new(conn).append(&NewChange::new(
                note.id,
                ChangeOperation::Create,
                NotePatch::full(&note),
                note.version,
            ))?;
            Ok(())
        })?;

        tracing::debug!(note_id = %note.id, "Created note");
        self.changed();
        Ok(note)
    }

    /// Apply a partial edit. Fields left `None` keep their current value.
    pub fn update_note(&self, id: &NoteId, patch: NotePatch) -> Result<Note> {
        let note = self.db.with_transaction(|conn| {
            let mut note = live_note(conn, id)?;
            if !patch.changes(&note) {
                return Err(Error::Validation("update changes nothing".to_string()));
            }

            note.apply_patch(&patch);
            if note.is_blank() {
                return Err(Error::Validation(
                    "a note needs a title or content".to_string(),
                ));
            }

            SqliteNoteStore::new(conn).put(&note)?;
            SqliteChangeLog::new(conn).append(&NewChange::new(
                note.id,
                ChangeOperation::Update,
                patch,
                note.version,
            ))?;
            Ok(note)
        })?;

        tracing::debug!(note_id = %note.id, version = note.version, "Updated note");
        self.changed();
        Ok(note)
    }

    /// Attach a picture reference, replacing any previous one.
    pub fn attach_picture(&self, id: &NoteId, reference: &str) -> Result<Note> {
        let reference = non_blank(Some(reference.to_string())).ok_or_else(|| {
            Error::Validation("picture reference must not be empty".to_string())
        })?;
        self.update_note(id, NotePatch::default().picture(reference))
    }

    /// Tombstone a note; it disappears from listings and is purged once the
    /// remote confirms the deletion.
    pub fn delete_note(&self, id: &NoteId) -> Result<()> {
        let version = self.db.with_transaction(|conn| {
            let mut note = live_note(conn, id)?;
            note.mark_deleted();
            SqliteNoteStore::new(conn).put(&note)?;
            SqliteChangeLog::new(conn).append(&NewChange::new(
                note.id,
                ChangeOperation::Delete,
                NotePatch::default(),
                note.version,
            ))?;
            Ok(note.version)
        })?;

        tracing::debug!(note_id = %id, version, "Deleted note");
        self.changed();
        Ok(())
    }

    /// Live notes, newest first
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        self.db.with_conn(|conn| SqliteNoteStore::new(conn).list())
    }

    pub fn get_note(&self, id: &NoteId) -> Result<Note> {
        self.db.with_conn(|conn| live_note(conn, id))
    }

    /// Change-log snapshot, oldest first
    pub fn pending_changes(&self) -> Result<Vec<ChangeLogEntry>> {
        self.db.with_conn(|conn| SqliteChangeLog::new(conn).pending())
    }

    /// Most recent server-wins resolutions
    pub fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        self.db
            .with_conn(|conn| SqliteNoteStore::new(conn).list_conflicts(limit))
    }

    /// Resolve a full id or an unambiguous prefix of a live note's id.
    pub fn resolve_id(&self, input: &str) -> Result<NoteId> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Validation("note id must not be empty".to_string()));
        }
        if let Ok(id) = input.parse::<NoteId>() {
            return Ok(id);
        }

        let matches = self
            .db
            .with_conn(|conn| SqliteNoteStore::new(conn).ids_by_prefix(input, 2))?;
        match matches.as_slice() {
            [] => Err(Error::NotFound(input.to_string())),
            [only] => only
                .parse()
                .map_err(|_| Error::Database(format!("stored note id is not a UUID: {only}"))),
            _ => Err(Error::Validation(format!(
                "note id prefix '{input}' is ambiguous"
            ))),
        }
    }

    fn changed(&self) {
        self.trigger.wake();
        self.events.emit(NoteEvent::NotesChanged);
    }
}

fn live_note(conn: &Connection, id: &NoteId) -> Result<Note> {
    SqliteNoteStore::new(conn)
        .get(id)?
        .filter(|note| !note.deleted)
        .ok_or_else(|| Error::NotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn service() -> NoteService {
        NoteService::new(SharedDatabase::open_in_memory().unwrap())
    }

    #[test]
    fn create_appends_full_create_entry() {
        let service = service();
        let note = service.create_note("Groceries", "Milk").unwrap();
        assert_eq!(note.version, 1);

        let pending = service.pending_changes().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, ChangeOperation::Create);
        assert_eq!(pending[0].payload, NotePatch::full(&note));
        assert_eq!(pending[0].base_version(), 0);
    }

    #[test]
    fn blank_note_is_rejected_without_log_entry() {
        let service = service();
        let error = service.create_note("  ", "\n").unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
        assert!(service.pending_changes().unwrap().is_empty());
        assert!(service.list_notes().unwrap().is_empty());
    }

    #[test]
    fn update_bumps_version_and_logs_patch() {
        let service = service();
        let note = service.create_note("Groceries", "Milk").unwrap();
        let updated = service
            .update_note(&note.id, NotePatch::default().content("Milk, Eggs"))
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "Groceries");
        assert_eq!(service.get_note(&note.id).unwrap(), updated);

        let pending = service.pending_changes().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].operation, ChangeOperation::Update);
        assert_eq!(pending[1].payload, NotePatch::default().content("Milk, Eggs"));
        assert_eq!(pending[1].base_version(), 1);
    }

    #[test]
    fn noop_or_blanking_update_is_rejected() {
        let service = service();
        let note = service.create_note("Title", "").unwrap();

        assert!(matches!(
            service.update_note(&note.id, NotePatch::default().title("Title")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.update_note(&note.id, NotePatch::default()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.update_note(&note.id, NotePatch::default().title("")),
            Err(Error::Validation(_))
        ));
        assert_eq!(service.get_note(&note.id).unwrap().version, 1);
        assert_eq!(service.pending_changes().unwrap().len(), 1);
    }

    #[test]
    fn missing_note_operations_fail_with_not_found() {
        let service = service();
        let id = NoteId::new();
        assert!(matches!(service.get_note(&id), Err(Error::NotFound(_))));
        assert!(matches!(
            service.update_note(&id, NotePatch::default().title("x")),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(service.delete_note(&id), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_hides_note_and_logs_empty_payload() {
        let service = service();
        let keep = service.create_note("Keep", "").unwrap();
        let gone = service.create_note("Gone", "").unwrap();
        service.delete_note(&gone.id).unwrap();

        let listed: Vec<NoteId> = service.list_notes().unwrap().iter().map(|n| n.id).collect();
        assert_eq!(listed, vec![keep.id]);
        assert!(matches!(service.get_note(&gone.id), Err(Error::NotFound(_))));
        assert!(matches!(service.delete_note(&gone.id), Err(Error::NotFound(_))));
        assert!(matches!(
            service.update_note(&gone.id, NotePatch::default().title("again")),
            Err(Error::NotFound(_))
        ));

        let last = service.pending_changes().unwrap().pop().unwrap();
        assert_eq!(last.operation, ChangeOperation::Delete);
        assert!(last.payload.is_empty());
        assert_eq!(last.version, 2);
    }

    #[test]
    fn attach_picture_is_an_update() {
        let service = service();
        let note = service.create_note("Receipt", "").unwrap();
        let updated = service.attach_picture(&note.id, " photos/receipt.jpg ").unwrap();

        assert_eq!(updated.picture.as_deref(), Some("photos/receipt.jpg"));
        assert_eq!(updated.version, 2);
        assert!(matches!(
            service.attach_picture(&note.id, "   "),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn mutations_emit_notes_changed() {
        let service = service();
        let mut rx = service.subscribe();
        let note = service.create_note("Ping", "").unwrap();
        service.delete_note(&note.id).unwrap();

        assert_eq!(rx.try_recv().unwrap(), NoteEvent::NotesChanged);
        assert_eq!(rx.try_recv().unwrap(), NoteEvent::NotesChanged);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resolve_id_accepts_unique_prefix() {
        let service = service();
        let note = service.create_note("Prefix", "").unwrap();
        let full = note.id.to_string();

        assert_eq!(service.resolve_id(&full).unwrap(), note.id);
        assert_eq!(service.resolve_id(&full[..8]).unwrap(), note.id);
        assert!(matches!(service.resolve_id("zzzz"), Err(Error::NotFound(_))));
        assert!(matches!(service.resolve_id(" "), Err(Error::Validation(_))));
    }

    #[test]
    fn listing_never_returns_tombstones() {
        let service = service();
        let mut live = Vec::new();
        for index in 0..6 {
            let note = service.create_note(format!("Note {index}"), "").unwrap();
            if index % 2 == 0 {
                service
                    .update_note(&note.id, NotePatch::default().content("edited"))
                    .unwrap();
                service.delete_note(&note.id).unwrap();
            } else {
                live.push(note.id);
            }
        }

        let listed = service.list_notes().unwrap();
        assert!(listed.iter().all(|note| !note.deleted));
        assert_eq!(listed.len(), live.len());
    }

    #[test]
    fn notes_and_pending_entries_survive_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("jotter.db");

        let note = {
            let service = NoteService::new(SharedDatabase::open(&path).unwrap());
            let note = service.create_note("Durable", "Survives restart").unwrap();
            service
                .update_note(&note.id, NotePatch::default().title("Still durable"))
                .unwrap();
            note
        };

        let reopened = NoteService::new(SharedDatabase::open(&path).unwrap());
        let stored = reopened.get_note(&note.id).unwrap();
        assert_eq!(stored.title, "Still durable");
        assert_eq!(stored.version, 2);
        assert_eq!(reopened.pending_changes().unwrap().len(), 2);
    }
}
