//! In-process remote backend with failure injection.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{NoteInput, RemoteApi, RemoteError, RemoteNote, RemoteResult};
use crate::models::NoteId;
use crate::util::unix_millis_now;

/// A call the remote received, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    List,
    Create(NoteInput),
    Update(NoteInput),
    Delete(NoteId),
}

#[derive(Debug, Default)]
struct MemoryState {
    notes: BTreeMap<NoteId, RemoteNote>,
    calls: Vec<RemoteCall>,
    offline: bool,
    failures_remaining: u32,
    responses_to_lose: u32,
    unauthorized: bool,
    assigns_versions: bool,
}

/// Authoritative in-memory backend.
///
/// Updates conflict when the stored version is newer than the input's base
/// version, unless the input replays the write that produced the stored
/// record. Accepted writes take the client's proposed version when it is
/// ahead of the stored one, or count up on their own with
/// [`set_assigns_versions`](Self::set_assigns_versions).
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<MemoryState>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every call with a transient error while `offline` is set
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Fail the next `count` calls with a transient error
    pub fn fail_next(&self, count: u32) {
        self.state().failures_remaining = count;
    }

    /// Apply the next `count` calls, then answer them with a transient error
    /// as if the response had been lost on the way back
    pub fn lose_next_responses(&self, count: u32) {
        self.state().responses_to_lose = count;
    }

    /// Ignore proposed versions: creates start at 1, updates add one
    pub fn set_assigns_versions(&self, assigns: bool) {
        self.state().assigns_versions = assigns;
    }

    /// Reject every call as unauthorized while set
    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.state().unauthorized = unauthorized;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn note(&self, id: &NoteId) -> Option<RemoteNote> {
        self.state().notes.get(id).cloned()
    }

    pub fn notes(&self) -> Vec<RemoteNote> {
        self.state().notes.values().cloned().collect()
    }

    /// Store a note as if another device had written it
    pub fn seed(&self, note: RemoteNote) {
        self.state().notes.insert(note.id, note);
    }

    /// Apply an edit as another device would, bumping the version
    pub fn edit_from_other_device(
        &self,
        id: &NoteId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Option<RemoteNote> {
        let mut state = self.state();
        let note = state.notes.get_mut(id)?;
        if let Some(title) = title {
            note.title = title.to_string();
        }
        if let Some(content) = content {
            note.content = content.to_string();
        }
        note.version += 1;
        note.updated_at = unix_millis_now();
        Some(note.clone())
    }

    /// Delete a note as another device would
    pub fn delete_from_other_device(&self, id: &NoteId) -> bool {
        self.state().notes.remove(id).is_some()
    }

    fn admit(state: &mut MemoryState, call: RemoteCall) -> RemoteResult<()> {
        state.calls.push(call);
        if state.unauthorized {
            return Err(RemoteError::Unauthorized);
        }
        if state.offline {
            return Err(RemoteError::Transient("network unavailable".to_string()));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(RemoteError::Transient("request timed out".to_string()));
        }
        Ok(())
    }

    fn deliver<T>(state: &mut MemoryState, response: T) -> RemoteResult<T> {
        if state.responses_to_lose > 0 {
            state.responses_to_lose -= 1;
            return Err(RemoteError::Transient("response lost".to_string()));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn list_notes(&self) -> RemoteResult<Vec<RemoteNote>> {
        let mut state = self.state();
        Self::admit(&mut state, RemoteCall::List)?;
        let notes: Vec<RemoteNote> = state.notes.values().cloned().collect();
        Self::deliver(&mut state, notes)
    }

    async fn create_note(&self, input: &NoteInput) -> RemoteResult<RemoteNote> {
        let mut state = self.state();
        Self::admit(&mut state, RemoteCall::Create(input.clone()))?;

        if let Some(existing) = state.notes.get(&input.id).cloned() {
            return Self::deliver(&mut state, existing);
        }

        let now = unix_millis_now();
        let note = RemoteNote {
            id: input.id,
            title: input.title.clone().unwrap_or_default(),
            content: input.content.clone().unwrap_or_default(),
            picture: input.picture.clone(),
            created_at: now,
            updated_at: now,
            version: if state.assigns_versions {
                1
            } else {
                input.version.max(1)
            },
            deleted: false,
        };
        state.notes.insert(note.id, note.clone());
        Self::deliver(&mut state, note)
    }

    async fn update_note(&self, input: &NoteInput) -> RemoteResult<RemoteNote> {
        let mut state = self.state();
        Self::admit(&mut state, RemoteCall::Update(input.clone()))?;

        let assigns_versions = state.assigns_versions;
        let note = state.notes.get_mut(&input.id).ok_or(RemoteError::NotFound)?;
        if note.version > input.base_version {
            let current = note.clone();
            if current.version == input.version && current.reflects(&input.patch()) {
                return Self::deliver(&mut state, current);
            }
            return Err(RemoteError::Conflict(Box::new(current)));
        }

        if let Some(title) = &input.title {
            note.title.clone_from(title);
        }
        if let Some(content) = &input.content {
            note.content.clone_from(content);
        }
        if let Some(picture) = &input.picture {
            note.picture = Some(picture.clone());
        }
        note.version = if assigns_versions {
            note.version + 1
        } else {
            input.version.max(note.version + 1)
        };
        note.updated_at = unix_millis_now().max(note.updated_at);
        let updated = note.clone();
        Self::deliver(&mut state, updated)
    }

    async fn delete_note(&self, id: &NoteId) -> RemoteResult<()> {
        let mut state = self.state();
        Self::admit(&mut state, RemoteCall::Delete(*id))?;
        state.notes.remove(id).ok_or(RemoteError::NotFound)?;
        Self::deliver(&mut state, ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotePatch;

    fn create_input(id: NoteId, title: &str, version: i64) -> NoteInput {
        NoteInput::new(id, NotePatch::default().title(title).content(""), version, 0)
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let remote = InMemoryRemote::new();
        let id = NoteId::new();

        let first = remote.create_note(&create_input(id, "a", 1)).await.unwrap();
        let again = remote.create_note(&create_input(id, "b", 1)).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(remote.notes().len(), 1);
    }

    #[tokio::test]
    async fn update_conflicts_on_stale_base() {
        let remote = InMemoryRemote::new();
        let id = NoteId::new();
        remote.create_note(&create_input(id, "a", 1)).await.unwrap();
        remote.edit_from_other_device(&id, Some("other"), None);

        let stale = NoteInput::new(id, NotePatch::default().title("mine"), 2, 1);
        match remote.update_note(&stale).await {
            Err(RemoteError::Conflict(current)) => {
                assert_eq!(current.version, 2);
                assert_eq!(current.title, "other");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_takes_proposed_version() {
        let remote = InMemoryRemote::new();
        let id = NoteId::new();
        remote.create_note(&create_input(id, "a", 1)).await.unwrap();

        let input = NoteInput::new(id, NotePatch::default().content("body"), 2, 1);
        let updated = remote.update_note(&input).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "a");
        assert_eq!(updated.content, "body");
    }

    #[tokio::test]
    async fn replayed_update_returns_stored_record() {
        let remote = InMemoryRemote::new();
        let id = NoteId::new();
        remote.create_note(&create_input(id, "a", 1)).await.unwrap();

        let input = NoteInput::new(id, NotePatch::default().content("body"), 2, 1);
        remote.lose_next_responses(1);
        assert!(matches!(
            remote.update_note(&input).await,
            Err(RemoteError::Transient(_))
        ));
        assert_eq!(remote.note(&id).unwrap().version, 2);

        let replayed = remote.update_note(&input).await.unwrap();
        assert_eq!(replayed.version, 2);
        assert_eq!(replayed.content, "body");

        let different = NoteInput::new(id, NotePatch::default().content("other"), 2, 1);
        assert!(matches!(
            remote.update_note(&different).await,
            Err(RemoteError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn assigned_versions_ignore_proposals() {
        let remote = InMemoryRemote::new();
        remote.set_assigns_versions(true);
        let id = NoteId::new();

        let created = remote.create_note(&create_input(id, "a", 3)).await.unwrap();
        assert_eq!(created.version, 1);
        let input = NoteInput::new(id, NotePatch::default().title("b"), 7, 1);
        assert_eq!(remote.update_note(&input).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn lost_delete_is_applied() {
        let remote = InMemoryRemote::new();
        let id = NoteId::new();
        remote.create_note(&create_input(id, "a", 1)).await.unwrap();

        remote.lose_next_responses(1);
        assert!(remote.delete_note(&id).await.is_err());
        assert!(remote.note(&id).is_none());
        assert!(matches!(
            remote.delete_note(&id).await,
            Err(RemoteError::NotFound)
        ));
    }

    #[tokio::test]
    async fn failure_injection() {
        let remote = InMemoryRemote::new();
        remote.fail_next(1);
        assert!(matches!(
            remote.list_notes().await,
            Err(RemoteError::Transient(_))
        ));
        assert!(remote.list_notes().await.is_ok());

        remote.set_offline(true);
        assert!(remote.delete_note(&NoteId::new()).await.is_err());
        remote.set_offline(false);
        assert!(matches!(
            remote.delete_note(&NoteId::new()).await,
            Err(RemoteError::NotFound)
        ));

        remote.set_unauthorized(true);
        assert!(matches!(
            remote.list_notes().await,
            Err(RemoteError::Unauthorized)
        ));
        assert_eq!(remote.calls().len(), 5);
    }
}
