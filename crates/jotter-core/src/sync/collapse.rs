//! Collapsing queued change-log entries into one remote call per note.

use std::collections::HashMap;

use crate::models::{ChangeLogEntry, ChangeOperation, NoteId, NotePatch};
use crate::remote::{NoteInput, RemoteNote};

/// The single remote operation a group of entries reduces to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOp {
    Create,
    Update,
    Delete,
    /// Created and deleted before any push was attempted
    Discard,
}

impl PushOp {
    const fn from_first(operation: ChangeOperation) -> Self {
        match operation {
            ChangeOperation::Create => Self::Create,
            ChangeOperation::Update => Self::Update,
            ChangeOperation::Delete => Self::Delete,
        }
    }

    /// Fold the next queued operation into this one
    const fn then(self, next: ChangeOperation) -> Self {
        match (self, next) {
            (Self::Create, ChangeOperation::Delete) | (Self::Discard, _) => Self::Discard,
            (Self::Create, _) => Self::Create,
            (Self::Update, ChangeOperation::Delete) | (Self::Delete, _) => Self::Delete,
            (Self::Update, _) => Self::Update,
        }
    }
}

/// Pending entries of one note, reduced to one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGroup {
    pub note_id: NoteId,
    pub op: PushOp,
    /// Merged payload; later entries win field by field
    pub patch: NotePatch,
    /// Version produced by the last entry
    pub version: i64,
    /// Version the first entry was made against
    pub base_version: i64,
    /// Covered entries, ascending by `local_seq`
    pub entries: Vec<ChangeLogEntry>,
}

impl PendingGroup {
    /// Fold entries of a single note, already in `local_seq` order
    fn from_entries(entries: Vec<ChangeLogEntry>) -> Option<Self> {
        let (first, rest) = entries.split_first()?;
        let mut op = PushOp::from_first(first.operation);
        let mut patch = first.payload.clone();
        for entry in rest {
            op = op.then(entry.operation);
            patch.merge(&entry.payload);
        }

        // A failed create may still have landed; its deletion has to reach the remote.
        if op == PushOp::Discard && entries.iter().any(|entry| entry.attempts > 0) {
            op = PushOp::Delete;
        }

        Some(Self {
            note_id: first.note_id,
            op,
            patch,
            base_version: first.base_version(),
            version: entries.last().map_or(first.version, |last| last.version),
            entries,
        })
    }

    pub fn seqs(&self) -> Vec<i64> {
        self.entries.iter().map(|entry| entry.local_seq).collect()
    }

    /// Remote input for a create or update
    pub fn input(&self) -> NoteInput {
        let base_version = match self.op {
            PushOp::Create => 0,
            _ => self.base_version,
        };
        NoteInput::new(self.note_id, self.patch.clone(), self.version, base_version)
    }

    /// How many leading entries a conflicting remote record already carries.
    ///
    /// When a response is lost the remote keeps the version an attempted
    /// entry produced, with every field merged up to that entry. Zero means
    /// the record holds somebody else's write.
    pub fn landed(&self, current: &RemoteNote) -> usize {
        if current.deleted {
            return 0;
        }

        let mut merged = NotePatch::default();
        let mut landed = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            merged.merge(&entry.payload);
            if entry.attempts > 0 && entry.version == current.version && current.reflects(&merged)
            {
                landed = index + 1;
            }
        }
        landed
    }

    /// The entries after the first `count`, rebased on the remote `base_version`
    pub fn remainder(&self, count: usize, base_version: i64) -> Option<Self> {
        let rest = self.entries.get(count..)?.to_vec();
        let mut group = Self::from_entries(rest)?;
        group.base_version = base_version;
        Some(group)
    }
}

/// Group entries by note, preserving `local_seq` order within each group.
///
/// Groups come out ordered by their earliest entry.
pub fn group_pending(entries: Vec<ChangeLogEntry>) -> Vec<PendingGroup> {
    let mut by_note: Vec<Vec<ChangeLogEntry>> = Vec::new();
    let mut index: HashMap<NoteId, usize> = HashMap::new();

    let mut entries = entries;
    entries.sort_by_key(|entry| entry.local_seq);

    for entry in entries {
        if let Some(&position) = index.get(&entry.note_id) {
            by_note[position].push(entry);
        } else {
            index.insert(entry.note_id, by_note.len());
            by_note.push(vec![entry]);
        }
    }

    by_note
        .into_iter()
        .filter_map(PendingGroup::from_entries)
        .collect()
}
