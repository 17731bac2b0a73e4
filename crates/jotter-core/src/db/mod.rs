//! Database layer for Jotter

mod change_log;
mod connection;
mod migrations;
mod note_store;

pub use change_log::{ChangeLog, SqliteChangeLog};
pub use connection::{Database, SharedDatabase};
pub use note_store::{NoteStore, PutOutcome, SqliteNoteStore};
