//! Brute-force index: every query scans every vector.

use super::snapshot::{self, Snapshot};
use super::{IndexKind, SearchHit, SimilarityIndex, top_k, validate_batch, validate_query};
use crate::error::{IndexError, IndexResult};
use crate::vector::VectorDimension;
use rayon::prelude::*;
use std::path::Path;

/// Exact squared-L2 index without removal.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: VectorDimension,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub(crate) fn from_snapshot(path: &Path, snapshot: Snapshot) -> IndexResult<Self> {
        let corrupt = |reason: String| IndexError::SnapshotCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        if snapshot.kind != IndexKind::Flat {
            return Err(corrupt(format!(
                "expected a flat snapshot, found {}",
                snapshot.kind
            )));
        }
        if !snapshot.payload.is_empty() {
            return Err(corrupt(format!(
                "{} unexpected payload bytes",
                snapshot.payload.len()
            )));
        }
        Ok(Self {
            dimension: snapshot.dimension,
            vectors: snapshot.vectors,
        })
    }

    /// Borrows the stored vectors in position order.
    #[must_use]
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

impl SimilarityIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn size(&self) -> usize {
        self.vectors.len()
    }

    fn build(&mut self, vectors: &[Vec<f32>]) -> IndexResult<()> {
        validate_batch(self.dimension, self.vectors.len(), vectors)?;
        self.vectors.extend_from_slice(vectors);
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> IndexResult<Vec<SearchHit>> {
        validate_query(self.dimension, vector, self.vectors.len())?;
        let k = k.min(self.vectors.len());

        let candidates = self
            .vectors
            .par_iter()
            .enumerate()
            .map(|(i, v)| (i as u32, v.as_slice()));
        Ok(top_k(vector, candidates, k))
    }

    fn persist(&self, path: &Path) -> IndexResult<()> {
        snapshot::write_snapshot(path, IndexKind::Flat, self.dimension, &self.vectors, &[])
    }

    fn load(&mut self, path: &Path) -> IndexResult<()> {
        let snapshot = snapshot::read_snapshot(path)?;
        *self = Self::from_snapshot(path, snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Position;
    use tempfile::TempDir;

    fn dim(d: usize) -> VectorDimension {
        VectorDimension::new(d).unwrap()
    }

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(dim(2));
        index
            .build(&[
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![0.0, 3.0],
                vec![1.0, 0.0],
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_build_assigns_positions_in_order() {
        let mut index = sample_index();
        assert_eq!(index.size(), 4);

        index.build(&[vec![5.0, 5.0]]).unwrap();
        let hits = index.query(&[5.0, 5.0], 1).unwrap();
        assert_eq!(hits[0].position, Position::new(4));
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_build_rejects_mismatch_and_leaves_index_unchanged() {
        let mut index = sample_index();
        let result = index.build(&[vec![1.0, 1.0], vec![1.0, 1.0, 1.0]]);

        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(index.size(), 4);
    }

    #[test]
    fn test_query_orders_and_breaks_ties_by_position() {
        let index = sample_index();
        let hits = index.query(&[1.0, 0.0], 4).unwrap();
        let positions: Vec<u32> = hits.iter().map(|h| h.position.get()).collect();

        assert_eq!(positions, vec![1, 3, 0, 2]);
        assert_eq!(hits[2].distance, 1.0);
        assert_eq!(hits[3].distance, 10.0);
    }

    #[test]
    fn test_k_larger_than_size_returns_everything() {
        let index = sample_index();
        assert_eq!(index.query(&[0.0, 0.0], 100).unwrap().len(), 4);
        assert!(index.query(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_errors() {
        let empty = FlatIndex::new(dim(2));
        assert!(matches!(
            empty.query(&[0.0, 0.0], 3),
            Err(IndexError::EmptyIndex)
        ));

        let index = sample_index();
        assert!(matches!(
            index.query(&[0.0], 3),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_remove_is_unsupported() {
        let mut index = sample_index();
        assert!(matches!(
            index.remove(Position::new(0)),
            Err(IndexError::Unsupported {
                operation: "remove",
                index_kind: "flat"
            })
        ));
        assert_eq!(index.size(), 4);
    }

    #[test]
    fn test_persist_load_answers_identically() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("flat.snap");
        let index = sample_index();
        index.persist(&path).unwrap();

        let mut loaded = FlatIndex::new(dim(7));
        loaded.load(&path).unwrap();

        assert_eq!(loaded.dimension(), dim(2));
        assert_eq!(loaded.size(), index.size());
        let query = [0.4, 0.7];
        assert_eq!(
            loaded.query(&query, 3).unwrap(),
            index.query(&query, 3).unwrap()
        );
    }

    #[test]
    fn test_failed_load_leaves_index_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("flat.snap");
        sample_index().persist(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let mut target = FlatIndex::new(dim(2));
        target.build(&[vec![9.0, 9.0]]).unwrap();
        assert!(matches!(
            target.load(&path),
            Err(IndexError::SnapshotCorrupt { .. })
        ));
        assert_eq!(target.size(), 1);
        assert_eq!(target.vectors()[0], vec![9.0, 9.0]);
    }
}
