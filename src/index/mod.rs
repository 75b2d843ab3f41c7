//! Exact nearest-neighbor indexes over one flat vector space.
//!
//! Every vector is addressed by its [`Position`], the zero-based rank at
//! which it was appended. Positions are stable for the lifetime of an
//! index and survive a persist/load round trip. The [`EntryTable`] built
//! alongside the index maps them back to `(entity, kind)`.
//!
//! Two variants implement [`SimilarityIndex`]:
//! - [`FlatIndex`]: brute-force scan, no removal
//! - [`IvfFlatIndex`]: k-means cells, probes the nearest cells and ranks
//!   their members exactly; supports tombstone removal

mod entries;
mod flat;
mod ivf;
mod manifest;
mod shared;
mod snapshot;

pub use entries::{EntryTable, IndexEntry};
pub use flat::FlatIndex;
pub use ivf::{IvfFlatIndex, IvfParams};
pub use manifest::{INDEX_MANIFEST_FILE, INDEX_SNAPSHOT_FILE, IndexManifest, LoadedIndex};
pub use shared::SharedIndex;
pub(crate) use snapshot::hex_digest;

use crate::error::{IndexError, IndexResult};
use crate::vector::{Position, VectorDimension, squared_l2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::path::Path;

/// One nearest-neighbor hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: Position,
    /// Squared Euclidean distance, never negative
    pub distance: f32,
}

/// Index variant, also the tag stored in snapshots and manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Flat,
    Ivf,
}

impl IndexKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            IndexKind::Flat => "flat",
            IndexKind::Ivf => "ivf",
        }
    }

    pub(crate) const fn to_tag(self) -> u32 {
        match self {
            IndexKind::Flat => 0,
            IndexKind::Ivf => 1,
        }
    }

    pub(crate) const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(IndexKind::Flat),
            1 => Some(IndexKind::Ivf),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nearest-neighbor index over vectors of one fixed dimension.
///
/// `query` takes `&self` and never mutates, so one built index can serve
/// concurrent queries. `build` and `load` are all-or-nothing: on error the
/// index is left exactly as it was.
pub trait SimilarityIndex: Send + Sync + fmt::Debug {
    fn kind(&self) -> IndexKind;

    fn dimension(&self) -> VectorDimension;

    /// Total number of positions, including removed ones.
    fn size(&self) -> usize;

    /// Appends `vectors` in order; the first gets position `size()`.
    ///
    /// Fails with `DimensionMismatch` if any vector has the wrong length;
    /// nothing is appended in that case.
    fn build(&mut self, vectors: &[Vec<f32>]) -> IndexResult<()>;

    /// Returns up to `k` hits ordered by ascending distance, ties broken by
    /// ascending position.
    fn query(&self, vector: &[f32], k: usize) -> IndexResult<Vec<SearchHit>>;

    /// Writes a snapshot to `path`, replacing any previous file atomically.
    fn persist(&self, path: &Path) -> IndexResult<()>;

    /// Replaces the contents of this index with the snapshot at `path`.
    fn load(&mut self, path: &Path) -> IndexResult<()>;

    /// Removes a position from future results without renumbering others.
    fn remove(&mut self, position: Position) -> IndexResult<()> {
        let _ = position;
        Err(IndexError::Unsupported {
            operation: "remove",
            index_kind: self.kind().as_str(),
        })
    }
}

/// Opens a snapshot of either variant.
pub fn open_snapshot(path: &Path) -> IndexResult<Box<dyn SimilarityIndex>> {
    let snapshot = snapshot::read_snapshot(path)?;
    match snapshot.kind {
        IndexKind::Flat => Ok(Box::new(FlatIndex::from_snapshot(path, snapshot)?)),
        IndexKind::Ivf => Ok(Box::new(IvfFlatIndex::from_snapshot(path, snapshot)?)),
    }
}

/// Creates an empty index of the configured variant.
#[must_use]
pub fn new_index(
    kind: IndexKind,
    dimension: VectorDimension,
    params: IvfParams,
) -> Box<dyn SimilarityIndex> {
    match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimension)),
        IndexKind::Ivf => Box::new(IvfFlatIndex::new(dimension, params)),
    }
}

/// Validates every vector before anything is appended to an index that
/// already holds `existing` positions.
pub(crate) fn validate_batch(
    dimension: VectorDimension,
    existing: usize,
    vectors: &[Vec<f32>],
) -> IndexResult<()> {
    let total = existing.saturating_add(vectors.len());
    if total > 0 && Position::from_index(total - 1).is_none() {
        return Err(IndexError::CapacityExceeded { requested: total });
    }
    for vector in vectors {
        dimension.validate_vector(vector)?;
    }
    Ok(())
}

pub(crate) fn validate_query(
    dimension: VectorDimension,
    vector: &[f32],
    live: usize,
) -> IndexResult<()> {
    if live == 0 {
        return Err(IndexError::EmptyIndex);
    }
    dimension.validate_vector(vector)?;
    Ok(())
}

/// Candidate ordered by distance, then position.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    position: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.position.cmp(&other.position))
    }
}

/// Ranks the candidate positions against `query` and keeps the best `k`.
///
/// Distances are computed in parallel, each one sequentially, so the result
/// does not depend on the thread count.
pub(crate) fn top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<SearchHit>
where
    I: IntoParallelIterator<Item = (u32, &'a [f32])>,
{
    if k == 0 {
        return Vec::new();
    }

    let scored: Vec<Candidate> = candidates
        .into_par_iter()
        .map(|(position, vector)| Candidate {
            distance: squared_l2(query, vector),
            position,
        })
        .collect();

    // Max-heap of the k best seen so far; the worst sits on top.
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for candidate in scored {
        heap.push(candidate);
        if heap.len() > k {
            heap.pop();
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|c| SearchHit {
            position: Position::new(c.position),
            distance: c.distance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_orders_by_distance_then_position() {
        let vectors: Vec<Vec<f32>> = vec![
            vec![2.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 0.0],
        ];
        let candidates: Vec<(u32, &[f32])> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u32, v.as_slice()))
            .collect();

        let hits = top_k(&[0.0, 0.0], candidates, 3);
        let positions: Vec<u32> = hits.iter().map(|h| h.position.get()).collect();
        assert_eq!(positions, vec![3, 1, 2]);
        assert_eq!(hits[1].distance, 1.0);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_batch_beyond_32_bit_positions_is_rejected() {
        let dimension = VectorDimension::new(2).unwrap();
        let batch = [vec![0.0, 0.0]];

        assert!(validate_batch(dimension, u32::MAX as usize, &batch).is_ok());
        assert!(matches!(
            validate_batch(dimension, u32::MAX as usize + 1, &batch),
            Err(IndexError::CapacityExceeded { requested }) if requested == u32::MAX as usize + 2
        ));
        assert!(validate_batch(dimension, u32::MAX as usize + 1, &[]).is_ok());
    }

    #[test]
    fn test_index_kind_tags() {
        for kind in [IndexKind::Flat, IndexKind::Ivf] {
            assert_eq!(IndexKind::from_tag(kind.to_tag()), Some(kind));
        }
        assert_eq!(IndexKind::from_tag(7), None);
        assert_eq!(IndexKind::Ivf.to_string(), "ivf");
    }
}
