//! Shared sync state types.

use serde::Serialize;

/// Phase of the sync engine, observable by the presentation layer.
///
/// A cycle walks `Idle -> Draining -> Reconciling -> Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    /// Pushing pending change-log entries to the remote.
    Draining,
    /// Pulling the remote listing and applying it locally.
    Reconciling,
}

/// Coarse sync status shown to users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Stalled,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Stalled => "stalled",
        }
    }
}
