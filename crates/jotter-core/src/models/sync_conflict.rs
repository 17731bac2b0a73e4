//! Sync conflict model

use serde::{Deserialize, Serialize};

/// Recorded sync conflict resolved by the server-wins strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Note involved in the conflict
    pub note_id: String,
    /// Local version whose change was discarded
    pub local_version: i64,
    /// Server version that replaced it (0 when the server had deleted the note)
    pub remote_version: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
