//! Persistent vector store and entity metadata.
//!
//! The store is the single source of truth for which vectors exist and in
//! which order they are handed to the index. Index positions are assigned
//! from that order, so [`VectorStore::load_all`] must be deterministic.

mod file;
mod memory;

pub use file::{CATALOG_FILE, Catalog, CatalogEntry, FileVectorStore, UpsertSummary, VECTORS_FILE};
pub use memory::InMemoryVectorStore;

use crate::vector::{EntityId, VectorDimension, VectorError, VectorKind, VectorRecord};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by vector store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store at '{path}' is unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    #[error("Invalid store format: {0}\nSuggestion: Re-ingest the affected videos")]
    InvalidFormat(String),

    #[error("Entity '{entity}' has more than one {kind} vector\nSuggestion: Only frame vectors may repeat")]
    DuplicateKind { entity: EntityId, kind: VectorKind },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of all stored vectors, in index insertion order.
pub trait VectorStore {
    /// Loads every record.
    ///
    /// Entities come in insertion order; inside an entity frame vectors come
    /// first (in stored order), then description, subtitle and audio.
    fn load_all(&self) -> Result<Vec<VectorRecord>, StoreError>;
}

/// Lookup of per-entity metadata needed to present results.
pub trait MetadataStore {
    /// Returns the URL of an entity, if one is known.
    fn url(&self, id: &EntityId) -> Option<String>;
}

/// All vectors of one entity, each explicitly tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityVectors {
    pub id: EntityId,
    pub url: String,
    pub vectors: Vec<(VectorKind, Vec<f32>)>,
}

impl EntityVectors {
    #[must_use]
    pub fn new(id: EntityId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            vectors: Vec::new(),
        }
    }

    /// Adds a vector of the given kind.
    #[must_use]
    pub fn with_vector(mut self, kind: VectorKind, vector: Vec<f32>) -> Self {
        self.vectors.push((kind, vector));
        self
    }

    /// Checks the per-entity invariants: every vector has `dimension` and
    /// non-frame kinds appear at most once.
    pub fn validate(&self, dimension: VectorDimension) -> Result<(), StoreError> {
        let mut seen = [false; VectorKind::ALL.len()];
        for (kind, vector) in &self.vectors {
            dimension.validate_vector(vector)?;
            let slot = &mut seen[kind.to_tag() as usize];
            if *slot && !kind.allows_many() {
                return Err(StoreError::DuplicateKind {
                    entity: self.id.clone(),
                    kind: *kind,
                });
            }
            *slot = true;
        }
        Ok(())
    }

    /// Returns the records of this entity in enumeration order.
    #[must_use]
    pub fn ordered_records(&self) -> Vec<VectorRecord> {
        let mut vectors: Vec<&(VectorKind, Vec<f32>)> = self.vectors.iter().collect();
        // Stable: frames keep their stored order.
        vectors.sort_by_key(|(kind, _)| *kind);
        vectors
            .into_iter()
            .map(|(kind, vector)| VectorRecord::new(self.id.clone(), *kind, vector.clone()))
            .collect()
    }

    /// Dimension of the first vector, if any.
    #[must_use]
    pub fn dimension_hint(&self) -> Option<usize> {
        self.vectors.first().map(|(_, vector)| vector.len())
    }
}

/// URL table keyed by entity id.
#[derive(Debug, Clone, Default)]
pub struct UrlTable {
    urls: HashMap<EntityId, String>,
}

impl UrlTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId, url: String) {
        self.urls.insert(id, url);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl MetadataStore for UrlTable {
    fn url(&self, id: &EntityId) -> Option<String> {
        self.urls.get(id).filter(|url| !url.is_empty()).cloned()
    }
}
