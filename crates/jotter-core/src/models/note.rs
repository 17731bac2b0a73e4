//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::unix_millis_now;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note as held in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier, never reassigned
    pub id: NoteId,
    pub title: String,
    pub content: String,
    /// Opaque reference to an attached picture
    pub picture: Option<String>,
    /// Creation timestamp (Unix ms), immutable
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Incremented on every accepted mutation
    pub version: i64,
    /// Tombstone flag, kept until the remote confirms deletion
    pub deleted: bool,
}

impl Note {
    /// Create a fresh note at version 1
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: NoteId::new(),
            title: title.into(),
            content: content.into(),
            picture: None,
            created_at: now,
            updated_at: now,
            version: 1,
            deleted: false,
        }
    }

    /// Check if both title and content are blank (whitespace-only counts as blank)
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }

    /// Title, or the first line of content when the title is blank, truncated to `max_len`
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }

    /// Apply a patch as a new local mutation: bumps version and `updated_at`.
    pub fn apply_patch(&mut self, patch: &NotePatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(content) = &patch.content {
            self.content.clone_from(content);
        }
        if let Some(picture) = &patch.picture {
            self.picture = Some(picture.clone());
        }
        self.version += 1;
        self.updated_at = unix_millis_now().max(self.updated_at);
    }

    /// Turn the note into a tombstone as a new local mutation.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.version += 1;
        self.updated_at = unix_millis_now().max(self.updated_at);
    }
}

/// A set of changed note fields; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl NotePatch {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    /// Patch carrying every field of `note`, used as a Create payload
    #[must_use]
    pub fn full(note: &Note) -> Self {
        Self {
            title: Some(note.title.clone()),
            content: Some(note.content.clone()),
            picture: note.picture.clone(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.picture.is_none()
    }

    /// Whether applying this patch to `note` would change any field
    #[must_use]
    pub fn changes(&self, note: &Note) -> bool {
        self.title.as_ref().is_some_and(|title| *title != note.title)
            || self
                .content
                .as_ref()
                .is_some_and(|content| *content != note.content)
            || self
                .picture
                .as_ref()
                .is_some_and(|picture| note.picture.as_ref() != Some(picture))
    }

    /// Layer `later` on top of this patch; later fields win.
    pub fn merge(&mut self, later: &Self) {
        if later.title.is_some() {
            self.title.clone_from(&later.title);
        }
        if later.content.is_some() {
            self.content.clone_from(&later.content);
        }
        if later.picture.is_some() {
            self.picture.clone_from(&later.picture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Groceries", "Milk");
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.version, 1);
        assert!(!note.deleted);
        assert!(note.created_at > 0);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_is_blank() {
        assert!(Note::new("  ", "\n").is_blank());
        assert!(!Note::new("", "text").is_blank());
        assert!(!Note::new("title", "").is_blank());
    }

    #[test]
    fn test_apply_patch_bumps_version() {
        let mut note = Note::new("Groceries", "Milk");
        let created_at = note.created_at;
        note.apply_patch(&NotePatch::default().content("Milk, Eggs"));

        assert_eq!(note.version, 2);
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "Milk, Eggs");
        assert_eq!(note.created_at, created_at);
        assert!(note.updated_at >= created_at);
    }

    #[test]
    fn test_mark_deleted() {
        let mut note = Note::new("a", "b");
        note.mark_deleted();
        assert!(note.deleted);
        assert_eq!(note.version, 2);
    }

    #[test]
    fn test_title_preview_falls_back_to_content() {
        let note = Note::new("", "First line\nSecond line");
        assert_eq!(note.title_preview(50), "First line");
        assert_eq!(note.title_preview(5), "First");

        let titled = Note::new("Title", "Body");
        assert_eq!(titled.title_preview(50), "Title");
    }

    #[test]
    fn test_patch_merge_later_wins() {
        let mut patch = NotePatch::default().title("one").content("first");
        patch.merge(&NotePatch::default().content("second").picture("pic-1"));

        assert_eq!(patch.title.as_deref(), Some("one"));
        assert_eq!(patch.content.as_deref(), Some("second"));
        assert_eq!(patch.picture.as_deref(), Some("pic-1"));
    }

    #[test]
    fn test_patch_changes_detects_noop() {
        let note = Note::new("same", "body");
        assert!(!NotePatch::default().title("same").changes(&note));
        assert!(NotePatch::default().title("other").changes(&note));
        assert!(NotePatch::default().picture("p").changes(&note));
        assert!(NotePatch::default().is_empty());
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let json = serde_json::to_string(&NotePatch::default().content("x")).unwrap();
        assert_eq!(json, r#"{"content":"x"}"#);
        let parsed: NotePatch = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }
}
