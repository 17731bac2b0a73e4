//! Remote API contract.
//!
//! The backend assigns or confirms versions and timestamps; the sync engine
//! is the only caller.

mod graphql;
mod memory;

pub use graphql::GraphQlRemote;
pub use memory::{InMemoryRemote, RemoteCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Note, NoteId, NotePatch};

/// A note as the remote reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
    pub id: NoteId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub picture: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl RemoteNote {
    /// Whether the record already carries every field the patch sets
    pub fn reflects(&self, patch: &NotePatch) -> bool {
        patch.title.as_ref().map_or(true, |title| *title == self.title)
            && patch
                .content
                .as_ref()
                .map_or(true, |content| *content == self.content)
            && patch
                .picture
                .as_ref()
                .map_or(true, |picture| self.picture.as_ref() == Some(picture))
    }
}

impl From<RemoteNote> for Note {
    fn from(remote: RemoteNote) -> Self {
        Self {
            id: remote.id,
            title: remote.title,
            content: remote.content,
            picture: remote.picture,
            created_at: remote.created_at,
            updated_at: remote.updated_at,
            version: remote.version,
            deleted: remote.deleted,
        }
    }
}

/// Create/update input; absent fields are left unchanged by updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInput {
    pub id: NoteId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Version the client proposes for the result
    pub version: i64,
    /// Version the change was made against; 0 for creates
    pub base_version: i64,
}

impl NoteInput {
    pub fn new(id: NoteId, patch: NotePatch, version: i64, base_version: i64) -> Self {
        Self {
            id,
            title: patch.title,
            content: patch.content,
            picture: patch.picture,
            version,
            base_version,
        }
    }

    pub fn patch(&self) -> NotePatch {
        NotePatch {
            title: self.title.clone(),
            content: self.content.clone(),
            picture: self.picture.clone(),
        }
    }
}

/// Remote call failures
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote holds a newer version than the change was based on
    #[error("version conflict: remote holds version {}", .0.version)]
    Conflict(Box<RemoteNote>),

    #[error("note not found on remote")]
    NotFound,

    #[error("remote rejected the session")]
    Unauthorized,

    /// Network trouble, timeouts, throttling, server errors
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote refused the request outright
    #[error("remote rejected request: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Hosted notes API
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list_notes(&self) -> RemoteResult<Vec<RemoteNote>>;

    /// Idempotent per id: re-creating a stored id returns the stored note
    async fn create_note(&self, input: &NoteInput) -> RemoteResult<RemoteNote>;

    async fn update_note(&self, input: &NoteInput) -> RemoteResult<RemoteNote>;

    async fn delete_note(&self, id: &NoteId) -> RemoteResult<()>;
}
