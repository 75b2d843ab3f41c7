//! Index manifest and the snapshot/manifest pair loaded together.
//!
//! The manifest records what a snapshot was built from so a stale or
//! mismatched pair is caught at open time instead of producing wrong
//! entity attributions at query time.

use super::snapshot::read_checksum;
use super::{EntryTable, IndexKind, SimilarityIndex, open_snapshot};
use crate::error::{IndexError, IndexResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Manifest file name inside an index directory.
pub const INDEX_MANIFEST_FILE: &str = "manifest.json";

/// Snapshot file name inside an index directory.
pub const INDEX_SNAPSHOT_FILE: &str = "vectors.snap";

/// Metadata persisted next to a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Version of the manifest format
    pub version: u32,

    pub index_kind: IndexKind,

    /// Name of the encoder model the vectors came from
    pub model_name: String,

    pub dimension: usize,

    pub vector_count: usize,

    /// Unix timestamp when the index was built
    pub created_at: i64,

    /// SHA-256 trailer of the snapshot this manifest was saved with
    pub snapshot_sha256: String,

    /// Position to (entity, kind), in position order
    pub entries: EntryTable,
}

impl IndexManifest {
    /// Current manifest version
    const CURRENT_VERSION: u32 = 1;

    #[must_use]
    pub fn new(
        index_kind: IndexKind,
        model_name: impl Into<String>,
        dimension: usize,
        entries: EntryTable,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            index_kind,
            model_name: model_name.into(),
            dimension,
            vector_count: entries.len(),
            created_at: Utc::now().timestamp(),
            snapshot_sha256: String::new(),
            entries,
        }
    }

    /// Save the manifest into `dir`
    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let path = dir.join(INDEX_MANIFEST_FILE);
        let persistence = |source: std::io::Error| IndexError::Persistence {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IndexError::General(format!("Failed to serialize manifest: {e}")))?;

        std::fs::create_dir_all(dir).map_err(persistence)?;
        let mut temp = NamedTempFile::new_in(dir).map_err(persistence)?;
        temp.write_all(json.as_bytes()).map_err(persistence)?;
        temp.persist(&path).map_err(|e| persistence(e.error))?;
        Ok(())
    }

    /// Load the manifest from `dir`
    pub fn load(dir: &Path) -> IndexResult<Self> {
        let path = dir.join(INDEX_MANIFEST_FILE);
        if !path.exists() {
            return Err(IndexError::EmptyIndex);
        }

        let corrupt = |reason: String| IndexError::SnapshotCorrupt {
            path: path.clone(),
            reason,
        };
        let json = std::fs::read_to_string(&path).map_err(|e| corrupt(e.to_string()))?;
        let manifest: Self = serde_json::from_str(&json).map_err(|e| corrupt(e.to_string()))?;

        if manifest.version != Self::CURRENT_VERSION {
            return Err(corrupt(format!(
                "unsupported manifest version {} (expected {})",
                manifest.version,
                Self::CURRENT_VERSION
            )));
        }
        if manifest.vector_count != manifest.entries.len() {
            return Err(corrupt(format!(
                "manifest lists {} entries for {} vectors",
                manifest.entries.len(),
                manifest.vector_count
            )));
        }
        Ok(manifest)
    }

    /// Check that `index` is the snapshot this manifest describes.
    pub fn check_against(&self, index: &dyn SimilarityIndex, path: &Path) -> IndexResult<()> {
        let mut problems = Vec::new();
        if index.kind() != self.index_kind {
            problems.push(format!(
                "variant {} but manifest says {}",
                index.kind(),
                self.index_kind
            ));
        }
        if index.dimension().get() != self.dimension {
            problems.push(format!(
                "dimension {} but manifest says {}",
                index.dimension().get(),
                self.dimension
            ));
        }
        if index.size() != self.vector_count {
            problems.push(format!(
                "{} vectors but manifest says {}",
                index.size(),
                self.vector_count
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(IndexError::SnapshotCorrupt {
                path: path.to_path_buf(),
                reason: problems.join("; "),
            })
        }
    }
}

/// A snapshot opened together with its manifest.
#[derive(Debug)]
pub struct LoadedIndex {
    pub index: Box<dyn SimilarityIndex>,
    pub manifest: IndexManifest,
    pub dir: PathBuf,
}

impl LoadedIndex {
    /// Open `dir/vectors.snap` and `dir/manifest.json` and cross-check them.
    pub fn open(dir: &Path) -> IndexResult<Self> {
        let manifest = IndexManifest::load(dir)?;
        let snapshot_path = dir.join(INDEX_SNAPSHOT_FILE);
        let index = open_snapshot(&snapshot_path)?;
        manifest.check_against(index.as_ref(), &snapshot_path)?;

        let checksum = read_checksum(&snapshot_path)?;
        if checksum != manifest.snapshot_sha256 {
            return Err(IndexError::SnapshotCorrupt {
                path: snapshot_path,
                reason: "snapshot does not match the checksum recorded in the manifest"
                    .to_string(),
            });
        }

        tracing::debug!(
            "Opened {} index with {} vectors from {}",
            manifest.index_kind,
            manifest.vector_count,
            dir.display()
        );

        Ok(Self {
            index,
            manifest,
            dir: dir.to_path_buf(),
        })
    }

    /// Persist both files into `dir`, snapshot first.
    ///
    /// The manifest is saved with the snapshot's checksum, so a snapshot
    /// left behind by an interrupted persist never opens against it.
    pub fn persist(&mut self, dir: &Path) -> IndexResult<()> {
        self.manifest.check_against(self.index.as_ref(), dir)?;
        let snapshot_path = dir.join(INDEX_SNAPSHOT_FILE);
        self.index.persist(&snapshot_path)?;
        self.manifest.snapshot_sha256 = read_checksum(&snapshot_path)?;
        self.manifest.save(dir)
    }

    #[must_use]
    pub fn entries(&self) -> &EntryTable {
        &self.manifest.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use crate::vector::{EntityId, VectorDimension, VectorKind};
    use tempfile::TempDir;

    fn loaded_pair() -> LoadedIndex {
        let mut index = FlatIndex::new(VectorDimension::new(2).unwrap());
        index.build(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();

        let mut entries = EntryTable::new();
        entries.push(EntityId::new("a"), VectorKind::Video);
        entries.push(EntityId::new("a"), VectorKind::Audio);

        LoadedIndex {
            index: Box::new(index),
            manifest: IndexManifest::new(IndexKind::Flat, "mock", 2, entries),
            dir: PathBuf::new(),
        }
    }

    #[test]
    fn test_save_then_open() {
        let temp_dir = TempDir::new().unwrap();
        loaded_pair().persist(temp_dir.path()).unwrap();

        let opened = LoadedIndex::open(temp_dir.path()).unwrap();
        assert_eq!(opened.index.size(), 2);
        assert_eq!(opened.entries().len(), 2);
        assert_eq!(opened.manifest.model_name, "mock");
    }

    #[test]
    fn test_missing_manifest_means_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            LoadedIndex::open(temp_dir.path()),
            Err(IndexError::EmptyIndex)
        ));
    }

    #[test]
    fn test_foreign_snapshot_of_same_shape_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        loaded_pair().persist(temp_dir.path()).unwrap();

        // Same variant, dimension and count, different contents.
        let mut other = FlatIndex::new(VectorDimension::new(2).unwrap());
        other.build(&[vec![5.0, 5.0], vec![6.0, 6.0]]).unwrap();
        other.persist(&temp_dir.path().join(INDEX_SNAPSHOT_FILE)).unwrap();

        assert!(matches!(
            LoadedIndex::open(temp_dir.path()),
            Err(IndexError::SnapshotCorrupt { .. })
        ));
    }

    #[test]
    fn test_persist_records_snapshot_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let mut pair = loaded_pair();
        pair.persist(temp_dir.path()).unwrap();

        let saved = IndexManifest::load(temp_dir.path()).unwrap();
        assert_eq!(saved.snapshot_sha256.len(), 64);
        assert_eq!(saved.snapshot_sha256, pair.manifest.snapshot_sha256);
    }

    #[test]
    fn test_manifest_disagreement_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        loaded_pair().persist(temp_dir.path()).unwrap();

        let mut manifest = IndexManifest::load(temp_dir.path()).unwrap();
        manifest.dimension = 3;
        manifest.save(temp_dir.path()).unwrap();

        assert!(matches!(
            LoadedIndex::open(temp_dir.path()),
            Err(IndexError::SnapshotCorrupt { .. })
        ));
    }
}
