use std::io;

use jotter_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] jotter_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Failed to resolve a data directory; pass --db-path or set JOTTER_DB_PATH")]
    NoDataDir,
    #[error(
        "Sync is not configured. Set remote.graphql_url in the config file or JOTTER_GRAPHQL_URL."
    )]
    SyncNotConfigured,
    #[error("Not signed in. Set JOTTER_SESSION_TOKEN to sync.")]
    MissingSession,
}

impl CliError {
    /// Map core lookup failures onto the CLI's note-id errors.
    pub fn from_lookup(input: &str, error: jotter_core::Error) -> Self {
        match error {
            jotter_core::Error::NotFound(_) => Self::NoteNotFound(input.to_string()),
            jotter_core::Error::Validation(_) => {
                Self::AmbiguousNoteId(format!("ID prefix '{input}' is ambiguous"))
            }
            other => Self::Core(other),
        }
    }
}
