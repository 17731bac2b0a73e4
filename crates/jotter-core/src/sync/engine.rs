//! Sync engine: drains the change log against the remote, resolves conflicts
//! server-wins, retries with backoff and pulls remote-only changes.
//!
//! The engine is the only component that talks to the remote API or clears
//! change-log entries. Cycles never overlap; within a cycle each note's
//! collapsed group is pushed by one task, so writes for a note are serialized
//! while distinct notes fan out up to `max_in_flight`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::backoff::Backoff;
use super::collapse::{group_pending, PendingGroup, PushOp};
use crate::auth::{SessionProvider, SessionToken};
use crate::config::SyncSettings;
use crate::db::{ChangeLog, NoteStore, SharedDatabase, SqliteChangeLog, SqliteNoteStore};
use crate::error::Result;
use crate::events::{EventBus, NoteEvent};
use crate::models::{Note, NoteId};
use crate::remote::{NoteInput, RemoteApi, RemoteError, RemoteNote, RemoteResult};
use crate::state::{SyncPhase, SyncState};
use crate::util::unix_millis_now;

/// Sync metadata key holding the last successful full pull (Unix ms)
pub const LAST_PULL_AT_KEY: &str = "last_pull_at";

/// Summary of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// No usable session; nothing was attempted
    pub paused: bool,
    /// Groups confirmed by the remote
    pub pushed: usize,
    /// Local changes discarded in favour of the server
    pub conflicts: usize,
    /// Notes removed locally
    pub purged: usize,
    /// Groups that failed and stay pending
    pub failed: usize,
    /// Groups skipped because their backoff had not elapsed
    pub deferred: usize,
    /// Entries that crossed the retry ceiling during this cycle
    pub newly_stalled: usize,
    /// Pending entries at or above the retry ceiling after the cycle
    pub stalled: usize,
    /// Pending entries after the cycle
    pub remaining: usize,
    /// Remote notes applied by the full pull; `None` when no pull ran
    pub pulled: Option<usize>,
    pub pull_error: Option<String>,
    /// Earliest moment a held-back note becomes due again
    pub next_retry_in: Option<Duration>,
}

impl SyncReport {
    pub const fn state(&self) -> SyncState {
        if self.paused {
            SyncState::Offline
        } else if self.stalled > 0 {
            SyncState::Stalled
        } else if self.failed > 0 || self.pull_error.is_some() {
            SyncState::Offline
        } else if self.remaining > 0 {
            SyncState::Syncing
        } else {
            SyncState::Synced
        }
    }

    const fn touched_anything(&self) -> bool {
        self.pushed + self.conflicts + self.purged + self.failed > 0
            || matches!(self.pulled, Some(applied) if applied > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    SessionLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupOutcome {
    Pushed,
    Purged,
    Conflict,
    /// Server had deleted the note; local copy purged
    ServerDeleted,
    Failed { stalled: usize },
    SessionLost,
    Skipped,
}

struct Shared {
    db: SharedDatabase,
    remote: Arc<dyn RemoteApi>,
    session: Arc<dyn SessionProvider>,
    settings: SyncSettings,
    events: EventBus,
    backoff: Mutex<Backoff>,
    last_pull: Mutex<Option<Instant>>,
    cycle: tokio::sync::Mutex<()>,
    phase: watch::Sender<SyncPhase>,
}

/// Cloneable handle to the sync engine
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    pub fn new(
        db: SharedDatabase,
        remote: Arc<dyn RemoteApi>,
        session: Arc<dyn SessionProvider>,
        settings: SyncSettings,
        events: EventBus,
    ) -> Self {
        let backoff = Backoff::new(settings.backoff_base(), settings.backoff_max());
        let (phase, _rx) = watch::channel(SyncPhase::Idle);
        Self {
            shared: Arc::new(Shared {
                db,
                remote,
                session,
                settings,
                events,
                backoff: Mutex::new(backoff),
                last_pull: Mutex::new(None),
                cycle: tokio::sync::Mutex::new(()),
                phase,
            }),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.shared.settings
    }

    /// Observe `Idle -> Draining -> Reconciling -> Idle`
    pub fn phase(&self) -> watch::Receiver<SyncPhase> {
        self.shared.phase.subscribe()
    }

    pub fn session_watch(&self) -> Option<watch::Receiver<Option<SessionToken>>> {
        self.shared.session.watch()
    }

    /// Drain the change log; pull too when the pull interval has elapsed.
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        self.cycle(false).await
    }

    /// Drain the change log and always pull.
    pub async fn run_full_cycle(&self) -> Result<SyncReport> {
        self.cycle(true).await
    }

    async fn cycle(&self, force_pull: bool) -> Result<SyncReport> {
        let _running = self.shared.cycle.lock().await;
        let mut report = SyncReport::default();

        if self.shared.session.current().is_none() {
            tracing::debug!("No session available; sync paused");
            report.paused = true;
        } else {
            let phase = PhaseGuard::enter(&self.shared.phase, SyncPhase::Draining);
            let mut flow = self.push(&mut report).await?;
            if flow == Flow::Continue && (force_pull || self.pull_due()) {
                phase.set(SyncPhase::Reconciling);
                flow = self.pull(&mut report).await?;
            }
            if flow == Flow::SessionLost {
                self.shared.session.invalidate();
                self.shared.events.emit(NoteEvent::SessionLost);
                report.paused = true;
            }
        }

        self.tally_pending(&mut report)?;
        report.next_retry_in = self.shared.backoff().next_due(Instant::now());

        if report.touched_anything() {
            tracing::info!(
                pushed = report.pushed,
                conflicts = report.conflicts,
                purged = report.purged,
                failed = report.failed,
                remaining = report.remaining,
                "Sync cycle finished"
            );
        } else {
            tracing::debug!(
                paused = report.paused,
                deferred = report.deferred,
                remaining = report.remaining,
                "Sync cycle finished"
            );
        }
        self.shared
            .events
            .emit(NoteEvent::CycleFinished(report.clone()));
        Ok(report)
    }

    async fn push(&self, report: &mut SyncReport) -> Result<Flow> {
        let entries = self
            .shared
            .db
            .with_conn(|conn| SqliteChangeLog::new(conn).pending())?;
        if entries.is_empty() {
            return Ok(Flow::Continue);
        }

        let now = Instant::now();
        let permits = Arc::new(Semaphore::new(self.shared.settings.max_in_flight));
        let mut tasks = JoinSet::new();

        for group in group_pending(entries) {
            let held_back = self.shared.backoff().remaining(&group.note_id, now);
            if let Some(wait) = held_back {
                tracing::debug!(note_id = %group.note_id, ?wait, "Note held back by retry backoff");
                report.deferred += 1;
                continue;
            }

            let shared = Arc::clone(&self.shared);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Ok(GroupOutcome::Skipped);
                };
                shared.push_group(group).await
            });
        }

        let mut flow = Flow::Continue;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => match outcome {
                    GroupOutcome::Pushed => report.pushed += 1,
                    GroupOutcome::Purged => report.purged += 1,
                    GroupOutcome::Conflict => report.conflicts += 1,
                    GroupOutcome::ServerDeleted => {
                        report.conflicts += 1;
                        report.purged += 1;
                    }
                    GroupOutcome::Failed { stalled } => {
                        report.failed += 1;
                        report.newly_stalled += stalled;
                    }
                    GroupOutcome::SessionLost => {
                        if flow == Flow::Continue {
                            tracing::warn!("Remote rejected the session; stopping sync cycle");
                            tasks.abort_all();
                        }
                        flow = Flow::SessionLost;
                    }
                    GroupOutcome::Skipped => {}
                },
                Ok(Err(error)) => {
                    tracing::error!("Failed to record sync result locally: {error}");
                    report.failed += 1;
                }
                Err(error) if error.is_cancelled() => {}
                Err(error) => {
                    tracing::error!("Sync task failed: {error}");
                    report.failed += 1;
                }
            }
        }

        Ok(flow)
    }

    async fn pull(&self, report: &mut SyncReport) -> Result<Flow> {
        let notes = match self.shared.remote.list_notes().await {
            Ok(notes) => notes,
            Err(RemoteError::Unauthorized) => return Ok(Flow::SessionLost),
            Err(error) => {
                tracing::warn!("Full pull failed: {error}");
                report.pull_error = Some(error.to_string());
                return Ok(Flow::Continue);
            }
        };

        let listed = notes.len();
        let (applied, purged) = self.shared.db.with_transaction(|conn| {
            let counts = apply_listing(conn, notes)?;
            SqliteNoteStore::new(conn).meta_set(LAST_PULL_AT_KEY, &unix_millis_now().to_string())?;
            Ok(counts)
        })?;
        *self.shared.last_pull() = Some(Instant::now());

        tracing::debug!(listed, applied, purged, "Full pull applied");
        report.pulled = Some(applied);
        report.purged += purged;
        if applied + purged > 0 {
            self.shared.events.emit(NoteEvent::NotesChanged);
        }
        Ok(Flow::Continue)
    }

    fn pull_due(&self) -> bool {
        let last_pull = *self.shared.last_pull();
        match (last_pull, self.shared.settings.pull_interval()) {
            (None, _) => true,
            (Some(at), Some(interval)) => at.elapsed() >= interval,
            (Some(_), None) => false,
        }
    }

    fn tally_pending(&self, report: &mut SyncReport) -> Result<()> {
        let ceiling = self.shared.settings.retry_ceiling;
        let entries = self
            .shared
            .db
            .with_conn(|conn| SqliteChangeLog::new(conn).pending())?;
        report.remaining = entries.len();
        report.stalled = entries
            .iter()
            .filter(|entry| entry.attempts >= ceiling)
            .count();
        Ok(())
    }
}

impl Shared {
    fn backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_pull(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_pull.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn push_group(&self, group: PendingGroup) -> Result<GroupOutcome> {
        let mut group = group;
        loop {
            tracing::debug!(
                note_id = %group.note_id,
                op = ?group.op,
                entries = group.entries.len(),
                "Pushing note"
            );

            let result = match group.op {
                PushOp::Discard => return self.discard(&group),
                PushOp::Create => self.create_remote(&group).await.map(Some),
                PushOp::Update => self.remote.update_note(&group.input()).await.map(Some),
                PushOp::Delete => self.remote.delete_note(&group.note_id).await.map(|()| None),
            };

            return match result {
                Ok(Some(remote)) => self.confirm(&group, remote),
                Ok(None) => self.confirm_delete(&group),
                Err(RemoteError::NotFound) if group.op == PushOp::Delete => {
                    self.confirm_delete(&group)
                }
                Err(RemoteError::NotFound) if group.op == PushOp::Update => {
                    self.server_deleted(&group)
                }
                Err(RemoteError::Conflict(current)) => match group.landed(&current) {
                    0 => self.server_wins(&group, *current),
                    landed => match group.remainder(landed, current.version) {
                        Some(rest) => {
                            self.ack_landed(&group, landed, current.version)?;
                            group = rest;
                            continue;
                        }
                        None => self.confirm(&group, *current),
                    },
                },
                Err(RemoteError::Unauthorized) => Ok(GroupOutcome::SessionLost),
                Err(error) => self.record_failure(&group, &error),
            };
        }
    }

    /// Create, then bring the remote up to date if it already held an older copy.
    async fn create_remote(&self, group: &PendingGroup) -> RemoteResult<RemoteNote> {
        let created = self.remote.create_note(&group.input()).await?;
        if created.version >= group.version || created.reflects(&group.patch) {
            return Ok(created);
        }

        tracing::debug!(
            note_id = %group.note_id,
            remote_version = created.version,
            "Remote already held an older copy; sending update"
        );
        let input = NoteInput::new(
            group.note_id,
            group.patch.clone(),
            group.version,
            created.version,
        );
        self.remote.update_note(&input).await
    }

    /// Store the confirmed record. The remote's version is authoritative
    /// unless edits made during the push are still queued.
    fn confirm(&self, group: &PendingGroup, remote: RemoteNote) -> Result<GroupOutcome> {
        let note = Note::from(remote);
        let applied = self.db.with_transaction(|conn| {
            ack_all(conn, &group.seqs())?;
            let store = SqliteNoteStore::new(conn);
            if SqliteChangeLog::new(conn).has_pending(&note.id)? {
                Ok(store.put(&note)?.is_applied())
            } else {
                store.replace(&note)?;
                Ok(true)
            }
        })?;
        self.backoff().clear(&group.note_id);

        tracing::debug!(
            note_id = %group.note_id,
            version = note.version,
            applied,
            "Remote confirmed note"
        );
        Ok(GroupOutcome::Pushed)
    }

    /// Acknowledge entries an earlier attempt delivered despite the lost response
    fn ack_landed(&self, group: &PendingGroup, landed: usize, remote_version: i64) -> Result<()> {
        let seqs = group.seqs();
        self.db.with_transaction(|conn| ack_all(conn, &seqs[..landed]))?;
        tracing::debug!(
            note_id = %group.note_id,
            landed,
            remote_version,
            "Remote already held an earlier attempt; sending the rest"
        );
        Ok(())
    }

    fn confirm_delete(&self, group: &PendingGroup) -> Result<GroupOutcome> {
        self.db.with_transaction(|conn| {
            ack_all(conn, &group.seqs())?;
            purge_if_settled(conn, &group.note_id)
        })?;
        self.backoff().clear(&group.note_id);
        tracing::debug!(note_id = %group.note_id, "Remote confirmed deletion");
        Ok(GroupOutcome::Pushed)
    }

    fn discard(&self, group: &PendingGroup) -> Result<GroupOutcome> {
        self.db.with_transaction(|conn| {
            ack_all(conn, &group.seqs())?;
            purge_if_settled(conn, &group.note_id)
        })?;
        self.backoff().clear(&group.note_id);
        tracing::debug!(note_id = %group.note_id, "Note created and deleted offline; purged");
        Ok(GroupOutcome::Purged)
    }

    fn server_wins(&self, group: &PendingGroup, current: RemoteNote) -> Result<GroupOutcome> {
        let note = Note::from(current);
        self.db.with_transaction(|conn| {
            ack_all(conn, &group.seqs())?;
            let store = SqliteNoteStore::new(conn);
            if note.deleted && !SqliteChangeLog::new(conn).has_pending(&note.id)? {
                store.remove(&note.id)?;
            } else {
                store.replace(&note)?;
            }
            store.record_conflict(&group.note_id, group.version, note.version)
        })?;
        self.backoff().clear(&group.note_id);

        tracing::warn!(
            note_id = %group.note_id,
            local_version = group.version,
            remote_version = note.version,
            "Sync conflict resolved: server version kept"
        );
        self.events.emit(NoteEvent::ConflictResolved {
            note_id: group.note_id,
            local_version: group.version,
            remote_version: Some(note.version),
        });
        self.events.emit(NoteEvent::NotesChanged);
        Ok(GroupOutcome::Conflict)
    }

    fn server_deleted(&self, group: &PendingGroup) -> Result<GroupOutcome> {
        self.db.with_transaction(|conn| {
            let log = SqliteChangeLog::new(conn);
            for entry in log.pending_for(&group.note_id)? {
                log.ack(entry.local_seq)?;
            }
            let store = SqliteNoteStore::new(conn);
            store.remove(&group.note_id)?;
            store.record_conflict(&group.note_id, group.version, 0)
        })?;
        self.backoff().clear(&group.note_id);

        tracing::warn!(
            note_id = %group.note_id,
            local_version = group.version,
            "Note was deleted remotely; local changes discarded"
        );
        self.events.emit(NoteEvent::ConflictResolved {
            note_id: group.note_id,
            local_version: group.version,
            remote_version: None,
        });
        self.events.emit(NoteEvent::NotesChanged);
        Ok(GroupOutcome::ServerDeleted)
    }

    fn record_failure(&self, group: &PendingGroup, error: &RemoteError) -> Result<GroupOutcome> {
        let bumped = self.db.with_transaction(|conn| {
            let log = SqliteChangeLog::new(conn);
            group
                .entries
                .iter()
                .map(|entry| Ok((entry.local_seq, log.bump(entry.local_seq)?)))
                .collect::<Result<Vec<_>>>()
        })?;

        let attempts = bumped.iter().map(|(_, attempts)| *attempts).max().unwrap_or(0);
        let retry_in = self
            .backoff()
            .schedule(group.note_id, attempts, Instant::now());
        tracing::warn!(
            note_id = %group.note_id,
            attempts,
            ?retry_in,
            "Push failed, will retry: {error}"
        );

        let ceiling = self.settings.retry_ceiling;
        let mut stalled = 0;
        for (local_seq, attempts) in bumped {
            // Attempts grow by one per failure, so equality marks the crossing.
            if attempts == ceiling {
                stalled += 1;
                tracing::warn!(
                    note_id = %group.note_id,
                    local_seq,
                    attempts,
                    "Change reached the retry ceiling; still pending"
                );
                self.events.emit(NoteEvent::SyncStalled {
                    note_id: group.note_id,
                    local_seq,
                    attempts,
                });
            }
        }

        Ok(GroupOutcome::Failed { stalled })
    }
}

/// Apply a full remote listing: newer remote versions win, notes with pending
/// entries are left alone, and settled local notes missing remotely are purged.
///
/// Returns `(applied, purged)`.
fn apply_listing(conn: &Connection, notes: Vec<RemoteNote>) -> Result<(usize, usize)> {
    let store = SqliteNoteStore::new(conn);
    let log = SqliteChangeLog::new(conn);
    let mut listed = HashSet::with_capacity(notes.len());
    let mut applied = 0;
    let mut purged = 0;

    for remote in notes {
        listed.insert(remote.id);
        if log.has_pending(&remote.id)? {
            tracing::debug!(note_id = %remote.id, "Skipping pulled note with pending local changes");
            continue;
        }
        if remote.deleted {
            if store.remove(&remote.id)? {
                purged += 1;
            }
            continue;
        }
        if store.put_newer(&Note::from(remote))?.is_applied() {
            applied += 1;
        }
    }

    for id in store.all_ids()? {
        if !listed.contains(&id) && !log.has_pending(&id)? && store.remove(&id)? {
            tracing::debug!(note_id = %id, "Purged note deleted remotely");
            purged += 1;
        }
    }

    Ok((applied, purged))
}

fn ack_all(conn: &Connection, seqs: &[i64]) -> Result<()> {
    let log = SqliteChangeLog::new(conn);
    for seq in seqs {
        log.ack(*seq)?;
    }
    Ok(())
}

/// Remove a tombstoned note once nothing references it any more
fn purge_if_settled(conn: &Connection, note_id: &NoteId) -> Result<bool> {
    if SqliteChangeLog::new(conn).has_pending(note_id)? {
        return Ok(false);
    }
    SqliteNoteStore::new(conn).remove(note_id)
}

/// Publishes the current phase and falls back to `Idle` when the cycle ends or is cancelled
struct PhaseGuard<'a> {
    tx: &'a watch::Sender<SyncPhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(tx: &'a watch::Sender<SyncPhase>, phase: SyncPhase) -> Self {
        tx.send_replace(phase);
        Self { tx }
    }

    fn set(&self, phase: SyncPhase) {
        self.tx.send_replace(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.tx.send_replace(SyncPhase::Idle);
    }
}
