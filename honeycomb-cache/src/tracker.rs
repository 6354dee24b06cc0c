//! Registry of optimistic mutations awaiting server confirmation.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use honeycomb_core::{CoordId, EpochMs, TileRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a pending change (UUIDv7, so ids sort by creation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(Uuid);

impl ChangeId {
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Move,
}

/// One step of an undo plan, applied directly to the items map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoStep {
    /// Put this exact record back.
    Restore(TileRecord),
    /// Drop whatever is cached at this coordinate.
    Remove(CoordId),
}

/// A pending optimistic change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: ChangeId,
    pub kind: ChangeKind,
    pub coord_id: CoordId,
    /// The tile as it was before the change, `None` for creations.
    pub prior_snapshot: Option<TileRecord>,
    pub created_at: EpochMs,
    /// Steps that revert the optimistic echo, touching only affected keys.
    pub undo: Vec<UndoStep>,
}

/// Thread-safe map of pending changes keyed by [`ChangeId`].
#[derive(Debug, Default)]
pub struct ChangeTracker {
    changes: RwLock<HashMap<ChangeId, ChangeRecord>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        kind: ChangeKind,
        coord_id: CoordId,
        prior_snapshot: Option<TileRecord>,
        undo: Vec<UndoStep>,
        created_at: EpochMs,
    ) -> ChangeId {
        let id = ChangeId::now_v7();
        let record = ChangeRecord {
            id,
            kind,
            coord_id,
            prior_snapshot,
            created_at,
            undo,
        };
        self.changes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, record);
        id
    }

    /// Remove and return a change. `None` if it was already settled.
    pub fn take(&self, id: ChangeId) -> Option<ChangeRecord> {
        self.changes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn get(&self, id: ChangeId) -> Option<ChangeRecord> {
        self.changes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn contains(&self, id: ChangeId) -> bool {
        self.changes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Pending changes, oldest first.
    pub fn pending(&self) -> Vec<ChangeRecord> {
        let mut records: Vec<ChangeRecord> = self
            .changes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sort_by_creation(&mut records);
        records
    }

    /// Remove every pending change, oldest first.
    pub fn drain(&self) -> Vec<ChangeRecord> {
        let mut records: Vec<ChangeRecord> = self
            .changes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, record)| record)
            .collect();
        sort_by_creation(&mut records);
        records
    }

    pub fn len(&self) -> usize {
        self.changes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sort_by_creation(records: &mut [ChangeRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
