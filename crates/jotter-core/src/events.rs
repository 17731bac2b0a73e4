//! Notifications published to the presentation layer.

use tokio::sync::broadcast;

use crate::models::NoteId;
use crate::sync::SyncReport;

/// Buffered events per subscriber before the slowest one starts lagging
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    /// Local note state changed (façade mutation or sync applying remote state)
    NotesChanged,
    /// An entry crossed the retry ceiling; it stays pending
    SyncStalled {
        note_id: NoteId,
        local_seq: i64,
        attempts: u32,
    },
    /// A local change was discarded in favour of the server record
    ConflictResolved {
        note_id: NoteId,
        local_version: i64,
        /// `None` when the server had deleted the note
        remote_version: Option<i64>,
    },
    CycleFinished(SyncReport),
    /// The remote rejected the session; sync pauses until a new token arrives
    SessionLost,
}

/// Sender side shared by the note service and the sync engine
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NoteEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.tx.subscribe()
    }

    /// Publish without caring whether anyone listens
    pub fn emit(&self, event: NoteEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
