//! Typed on-disk vector store.
//!
//! A store directory holds two files:
//!
//! - `catalog.json`: format version, dimension, record count and the
//!   entities in insertion order with their URLs
//! - `vectors.vec`: fixed-width little-endian records read through a
//!   memory map
//!
//! # Vector File Format
//!
//! - Header (16 bytes): magic `VVEC`, version, dimension, record count
//! - Records: entity ordinal (u32), kind tag (u32), `dimension` f32 values
//!
//! The entity ordinal indexes into the catalog's entity list, so frame,
//! description, subtitle and audio vectors carry their owner and kind
//! explicitly instead of being inferred from their position.
//!
//! The catalog records the SHA-256 of the vector file it was written with.
//! A vector file that does not match it is rejected on load.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::{EntityVectors, StoreError, UrlTable, VectorStore};
use crate::index::hex_digest;
use crate::vector::{EntityId, VectorDimension, VectorKind, VectorRecord};

/// Catalog file name inside a store directory.
pub const CATALOG_FILE: &str = "catalog.json";

/// Vector file name inside a store directory.
pub const VECTORS_FILE: &str = "vectors.vec";

/// Previous vector file, kept while a new catalog is committed.
const VECTORS_BACKUP_FILE: &str = "vectors.vec.prev";

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the vector file header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify vector store files.
const MAGIC_BYTES: &[u8; 4] = b"VVEC";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Bytes per record prefix (entity ordinal + kind tag).
const RECORD_PREFIX: usize = 8;

/// Entity listing of a store, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Version of the store format
    pub version: u32,

    /// Dimension shared by every stored vector; unset until the first ingest
    pub dimension: Option<VectorDimension>,

    /// Number of records in the vector file
    pub vector_count: usize,

    /// SHA-256 of the vector file, lowercase hex; empty before the first ingest
    pub vectors_sha256: String,

    /// Entities in insertion order
    pub entities: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: EntityId,
    pub url: String,
    /// Unix timestamp of the last ingest of this entity
    pub ingested_at: i64,
}

impl Catalog {
    fn empty() -> Self {
        Self {
            version: STORAGE_VERSION,
            dimension: None,
            vector_count: 0,
            vectors_sha256: String::new(),
            entities: Vec::new(),
        }
    }

    /// Builds the URL table used to present search results.
    #[must_use]
    pub fn url_table(&self) -> UrlTable {
        let mut table = UrlTable::new();
        for entry in &self.entities {
            table.insert(entry.id.clone(), entry.url.clone());
        }
        table
    }
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub vectors_written: usize,
}

/// File-backed vector store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileVectorStore {
    root: PathBuf,
}

impl FileVectorStore {
    /// Creates a handle; nothing is read until the first call.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks if the store catalog exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.catalog_path().exists()
    }

    /// Reads the catalog.
    pub fn read_catalog(&self) -> Result<Catalog, StoreError> {
        let path = self.catalog_path();
        let json = std::fs::read_to_string(&path).map_err(|e| StoreError::Unavailable {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let catalog: Catalog = serde_json::from_str(&json).map_err(|e| {
            StoreError::InvalidFormat(format!("Failed to parse {}: {e}", path.display()))
        })?;

        if catalog.version != STORAGE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported catalog version {} (expected {STORAGE_VERSION})",
                catalog.version
            )));
        }

        Ok(catalog)
    }

    /// Loads every entity with its vectors, in catalog order.
    pub fn load_entities(&self) -> Result<(Catalog, Vec<EntityVectors>), StoreError> {
        let catalog = self.read_catalog()?;
        let mut entities: Vec<EntityVectors> = catalog
            .entities
            .iter()
            .map(|entry| EntityVectors::new(entry.id.clone(), entry.url.clone()))
            .collect();

        let Some(dimension) = catalog.dimension else {
            if catalog.vector_count != 0 {
                return Err(StoreError::InvalidFormat(
                    "Catalog lists vectors but no dimension".to_string(),
                ));
            }
            return Ok((catalog, entities));
        };

        let mmap = self.map_vectors()?;
        let (file_dimension, count) = read_header(&mmap)?;

        if hex_digest(&Sha256::digest(&mmap[..])) != catalog.vectors_sha256 {
            return Err(StoreError::InvalidFormat(format!(
                "{} does not match the checksum in {CATALOG_FILE}; re-ingest into a fresh store",
                self.vectors_path().display()
            )));
        }

        if file_dimension != dimension {
            return Err(StoreError::InvalidFormat(format!(
                "Vector file dimension {} does not match catalog dimension {}",
                file_dimension.get(),
                dimension.get()
            )));
        }
        if count != catalog.vector_count {
            return Err(StoreError::InvalidFormat(format!(
                "Vector file holds {count} records but catalog expects {}",
                catalog.vector_count
            )));
        }

        let record_size = RECORD_PREFIX + dimension.get() * BYTES_PER_F32;
        let expected_len = HEADER_SIZE + count * record_size;
        if mmap.len() != expected_len {
            return Err(StoreError::InvalidFormat(format!(
                "Vector file is {} bytes, expected {expected_len}",
                mmap.len()
            )));
        }

        for record in mmap[HEADER_SIZE..].chunks_exact(record_size) {
            let ordinal = read_u32(record, 0) as usize;
            let tag = read_u32(record, 4);
            let kind = VectorKind::from_tag(tag)
                .ok_or_else(|| StoreError::InvalidFormat(format!("Unknown vector kind tag {tag}")))?;
            let entity = entities.get_mut(ordinal).ok_or_else(|| {
                StoreError::InvalidFormat(format!("Record references unknown entity {ordinal}"))
            })?;

            let vector = record[RECORD_PREFIX..]
                .chunks_exact(BYTES_PER_F32)
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect();
            entity.vectors.push((kind, vector));
        }

        Ok((catalog, entities))
    }

    /// Inserts new entities at the end of the order, or replaces the vectors
    /// of entities that already exist while keeping their slot.
    ///
    /// Both files are staged as temp files before either is renamed into
    /// place; on any validation error nothing is written. If the catalog
    /// cannot be committed the previous vector file is restored.
    pub fn upsert(&self, incoming: Vec<EntityVectors>) -> Result<UpsertSummary, StoreError> {
        let (mut catalog, mut entities) = if self.exists() {
            self.load_entities()?
        } else {
            (Catalog::empty(), Vec::new())
        };

        let dimension = match catalog.dimension {
            Some(dimension) => dimension,
            None => {
                let hint = incoming
                    .iter()
                    .find_map(EntityVectors::dimension_hint)
                    .ok_or_else(|| {
                        StoreError::InvalidFormat(
                            "Cannot infer the store dimension: no vectors supplied".to_string(),
                        )
                    })?;
                VectorDimension::new(hint)?
            }
        };

        for entity in &incoming {
            entity.validate(dimension)?;
        }

        let now = Utc::now().timestamp();
        let mut summary = UpsertSummary::default();

        for entity in incoming {
            match entities.iter().position(|existing| existing.id == entity.id) {
                Some(slot) => {
                    catalog.entities[slot].url = entity.url.clone();
                    catalog.entities[slot].ingested_at = now;
                    entities[slot] = entity;
                    summary.replaced += 1;
                }
                None => {
                    catalog.entities.push(CatalogEntry {
                        id: entity.id.clone(),
                        url: entity.url.clone(),
                        ingested_at: now,
                    });
                    entities.push(entity);
                    summary.inserted += 1;
                }
            }
        }

        let vector_bytes = encode_vectors(dimension, &entities)?;
        catalog.dimension = Some(dimension);
        catalog.vector_count = entities.iter().map(|e| e.vectors.len()).sum();
        catalog.vectors_sha256 = hex_digest(&Sha256::digest(&vector_bytes));
        summary.vectors_written = catalog.vector_count;

        std::fs::create_dir_all(&self.root)?;
        let staged = self.stage(&catalog, &vector_bytes)?;
        self.commit(staged)?;

        tracing::info!(
            "Store at {} now holds {} entities and {} vectors",
            self.root.display(),
            catalog.entities.len(),
            catalog.vector_count
        );

        Ok(summary)
    }

    // Private helper methods

    fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    fn vectors_path(&self) -> PathBuf {
        self.root.join(VECTORS_FILE)
    }

    fn map_vectors(&self) -> Result<Mmap, StoreError> {
        let path = self.vectors_path();
        let file = File::open(&path).map_err(|e| StoreError::Unavailable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        // The store is only rewritten through rename, never in place.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(mmap)
    }

    fn backup_path(&self) -> PathBuf {
        self.root.join(VECTORS_BACKUP_FILE)
    }

    /// Writes both files to synced temp files next to their targets.
    fn stage(&self, catalog: &Catalog, vector_bytes: &[u8]) -> Result<StagedWrite, StoreError> {
        let json = serde_json::to_string_pretty(catalog)
            .map_err(|e| StoreError::InvalidFormat(format!("Failed to serialize catalog: {e}")))?;

        let mut vectors = NamedTempFile::new_in(&self.root)?;
        vectors.write_all(vector_bytes)?;
        vectors.as_file().sync_all()?;

        let mut catalog = NamedTempFile::new_in(&self.root)?;
        catalog.write_all(json.as_bytes())?;
        catalog.as_file().sync_all()?;

        Ok(StagedWrite { vectors, catalog })
    }

    /// Renames the staged files into place, vector file first.
    fn commit(&self, staged: StagedWrite) -> Result<(), StoreError> {
        let vectors_path = self.vectors_path();
        let backup_path = self.backup_path();

        match std::fs::remove_file(&backup_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        let had_previous = match std::fs::hard_link(&vectors_path, &backup_path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        staged
            .vectors
            .persist(&vectors_path)
            .map_err(|e| StoreError::Io(e.error))?;

        if let Err(e) = staged.catalog.persist(self.catalog_path()) {
            let restored = if had_previous {
                std::fs::rename(&backup_path, &vectors_path)
            } else {
                std::fs::remove_file(&vectors_path)
            };
            if let Err(restore) = restored {
                tracing::warn!(
                    "Could not restore {} after a failed catalog write: {restore}",
                    vectors_path.display()
                );
            }
            return Err(StoreError::Io(e.error));
        }

        if had_previous {
            let _ = std::fs::remove_file(&backup_path);
        }
        Ok(())
    }
}

/// Temp files holding the next store state, not yet visible.
struct StagedWrite {
    vectors: NamedTempFile,
    catalog: NamedTempFile,
}

/// Serializes the vector file: header, then one record per vector.
fn encode_vectors(
    dimension: VectorDimension,
    entities: &[EntityVectors],
) -> Result<Vec<u8>, StoreError> {
    let count: usize = entities.iter().map(|e| e.vectors.len()).sum();
    let count_u32 = u32::try_from(count)
        .map_err(|_| StoreError::InvalidFormat(format!("Too many vectors: {count}")))?;
    let dim = u32::try_from(dimension.get()).map_err(|_| {
        StoreError::InvalidFormat(format!("Dimension too large: {}", dimension.get()))
    })?;

    let record_size = RECORD_PREFIX + dimension.get() * BYTES_PER_F32;
    let mut bytes = Vec::with_capacity(HEADER_SIZE + count * record_size);
    bytes.extend_from_slice(MAGIC_BYTES);
    bytes.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&dim.to_le_bytes());
    bytes.extend_from_slice(&count_u32.to_le_bytes());

    for (ordinal, entity) in entities.iter().enumerate() {
        let ordinal = u32::try_from(ordinal)
            .map_err(|_| StoreError::InvalidFormat(format!("Too many entities: {ordinal}")))?;
        for (kind, vector) in &entity.vectors {
            bytes.extend_from_slice(&ordinal.to_le_bytes());
            bytes.extend_from_slice(&kind.to_tag().to_le_bytes());
            for &value in vector {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
    Ok(bytes)
}

impl VectorStore for FileVectorStore {
    fn load_all(&self) -> Result<Vec<VectorRecord>, StoreError> {
        let (_, entities) = self.load_entities()?;
        Ok(entities
            .iter()
            .flat_map(EntityVectors::ordered_records)
            .collect())
    }
}

fn read_header(mmap: &Mmap) -> Result<(VectorDimension, usize), StoreError> {
    if mmap.len() < HEADER_SIZE {
        return Err(StoreError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }

    if &mmap[0..4] != MAGIC_BYTES {
        return Err(StoreError::InvalidFormat("Invalid magic bytes".to_string()));
    }

    let version = read_u32(mmap, 4);
    if version != STORAGE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported vector file version {version} (expected {STORAGE_VERSION})"
        )));
    }

    let dimension = VectorDimension::new(read_u32(mmap, 8) as usize)?;
    let count = read_u32(mmap, 12) as usize;

    Ok((dimension, count))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
