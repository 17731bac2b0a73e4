//! Data models for Jotter

mod change;
mod note;
mod sync_conflict;

pub use change::{ChangeLogEntry, ChangeOperation, NewChange};
pub use note::{Note, NoteId, NotePatch};
pub use sync_conflict::SyncConflict;
