//! Application services shared by every client.

mod notes;

pub use notes::NoteService;
