//! Change log entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{NoteId, NotePatch};

/// Kind of local mutation recorded in the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown change operation '{other}'")),
        }
    }
}

/// A local mutation not yet confirmed by the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    /// Monotonic local sequence number, never reused
    pub local_seq: i64,
    pub note_id: NoteId,
    pub operation: ChangeOperation,
    /// Changed fields; empty for deletes
    pub payload: NotePatch,
    /// Note version produced by this mutation
    pub version: i64,
    /// Failed delivery attempts so far
    pub attempts: u32,
    /// Append timestamp (Unix ms)
    pub created_at: i64,
}

impl ChangeLogEntry {
    /// Version the mutation was made against
    #[must_use]
    pub const fn base_version(&self) -> i64 {
        self.version - 1
    }
}

/// A change to append; the log assigns `local_seq`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub note_id: NoteId,
    pub operation: ChangeOperation,
    pub payload: NotePatch,
    pub version: i64,
}

impl NewChange {
    #[must_use]
    pub const fn new(
        note_id: NoteId,
        operation: ChangeOperation,
        payload: NotePatch,
        version: i64,
    ) -> Self {
        Self {
            note_id,
            operation,
            payload,
            version,
        }
    }
}
