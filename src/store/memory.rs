//! In-memory store for tests and embedding the engine in other programs.

use super::{EntityVectors, MetadataStore, StoreError, VectorStore};
use crate::vector::{EntityId, VectorDimension, VectorRecord};

/// Holds entities in insertion order; same replace-in-place rules as the
/// file store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    dimension: Option<VectorDimension>,
    entities: Vec<EntityVectors>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity, or replaces the one with the same id.
    pub fn insert(&mut self, entity: EntityVectors) -> Result<(), StoreError> {
        let dimension = match self.dimension {
            Some(dimension) => dimension,
            None => match entity.dimension_hint() {
                Some(hint) => VectorDimension::new(hint)?,
                None => {
                    self.push_or_replace(entity);
                    return Ok(());
                }
            },
        };

        entity.validate(dimension)?;
        self.dimension = Some(dimension);
        self.push_or_replace(entity);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn push_or_replace(&mut self, entity: EntityVectors) {
        match self.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(slot) => *slot = entity,
            None => self.entities.push(entity),
        }
    }
}

impl VectorStore for InMemoryVectorStore {
    fn load_all(&self) -> Result<Vec<VectorRecord>, StoreError> {
        Ok(self
            .entities
            .iter()
            .flat_map(EntityVectors::ordered_records)
            .collect())
    }
}

impl MetadataStore for InMemoryVectorStore {
    fn url(&self, id: &EntityId) -> Option<String> {
        self.entities
            .iter()
            .find(|e| &e.id == id)
            .map(|e| e.url.clone())
            .filter(|url| !url.is_empty())
    }
}
