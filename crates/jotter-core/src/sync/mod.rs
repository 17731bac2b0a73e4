//! Background reconciliation of the local store with the remote API.

mod backoff;
mod collapse;
mod engine;
mod worker;

pub use collapse::{group_pending, PendingGroup, PushOp};
pub use engine::{SyncEngine, SyncReport, LAST_PULL_AT_KEY};
pub use worker::{SyncHandle, SyncTrigger, SyncWorker};
