//! Position to `(entity, kind)` table captured when an index is built.

use crate::error::{IndexError, IndexResult};
use crate::vector::{EntityId, Position, VectorKind, VectorRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Owner and modality of one indexed vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub entity_id: EntityId,
    pub kind: VectorKind,
}

/// Dense table indexed by [`Position`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryTable {
    entries: Vec<IndexEntry>,
}

impl EntryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the table in the order the records are handed to the index.
    #[must_use]
    pub fn from_records(records: &[VectorRecord]) -> Self {
        Self {
            entries: records
                .iter()
                .map(|record| IndexEntry {
                    entity_id: record.entity_id.clone(),
                    kind: record.kind,
                })
                .collect(),
        }
    }

    pub fn push(&mut self, entity_id: EntityId, kind: VectorKind) {
        self.entries.push(IndexEntry { entity_id, kind });
    }

    /// Resolves a position.
    pub fn resolve(&self, position: Position) -> IndexResult<&IndexEntry> {
        self.entries
            .get(position.index())
            .ok_or(IndexError::InvalidPosition { position })
    }

    #[must_use]
    pub fn get(&self, position: Position) -> Option<&IndexEntry> {
        self.entries.get(position.index())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| &entry.entity_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Vector count per kind, in kind order.
    #[must_use]
    pub fn kind_counts(&self) -> [(VectorKind, usize); 4] {
        let mut counts = VectorKind::ALL.map(|kind| (kind, 0));
        for entry in &self.entries {
            counts[entry.kind.to_tag() as usize].1 += 1;
        }
        counts
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }
}
