//! jotter-core - Core library for Jotter
//!
//! Local-first note synchronization: a durable local store, a change log of
//! unconfirmed mutations, a background sync engine reconciling against the
//! hosted API, and the note service façade every client calls.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use events::NoteEvent;
pub use models::{Note, NoteId, NotePatch};
pub use services::NoteService;
