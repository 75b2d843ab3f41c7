//! IVF-flat index: k-means cells over exact vectors.
//!
//! Build partitions every vector into one of `nlist` cells. A query ranks
//! only the members of the `nprobe` cells whose centroids are nearest to it,
//! trading recall for speed on large collections. Distances inside the
//! probed cells are exact.
//!
//! Removal marks a tombstone: the position keeps its slot (and its vector),
//! stops appearing in results, and no other position moves.

use super::snapshot::{self, ByteReader, Snapshot};
use super::{IndexKind, SearchHit, SimilarityIndex, top_k, validate_batch, validate_query};
use crate::error::{IndexError, IndexResult};
use crate::vector::{Position, VectorDimension, kmeans_clustering, nearest_centroids};
use rayon::prelude::*;
use std::path::Path;

/// Cell layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfParams {
    /// Requested number of cells; capped at the vector count
    pub nlist: usize,
    /// Cells probed per query
    pub nprobe: usize,
    /// Seed for k-means++ initialization
    pub seed: u64,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 100,
            nprobe: 8,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IvfFlatIndex {
    dimension: VectorDimension,
    params: IvfParams,
    vectors: Vec<Vec<f32>>,
    centroids: Vec<Vec<f32>>,
    /// Cell of each position
    assignments: Vec<u32>,
    /// Positions of each cell, ascending
    cells: Vec<Vec<u32>>,
    tombstones: Vec<bool>,
    live: usize,
}

impl IvfFlatIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension, params: IvfParams) -> Self {
        Self {
            dimension,
            params,
            vectors: Vec::new(),
            centroids: Vec::new(),
            assignments: Vec::new(),
            cells: Vec::new(),
            tombstones: Vec::new(),
            live: 0,
        }
    }

    #[must_use]
    pub fn params(&self) -> IvfParams {
        self.params
    }

    /// Number of trained cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.centroids.len()
    }

    /// Number of positions not removed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_removed(&self, position: Position) -> bool {
        self.tombstones
            .get(position.index())
            .copied()
            .unwrap_or(false)
    }

    fn group_cells(cell_count: usize, assignments: &[u32]) -> Vec<Vec<u32>> {
        let mut cells = vec![Vec::new(); cell_count];
        for (position, &cell) in assignments.iter().enumerate() {
            cells[cell as usize].push(position as u32);
        }
        cells
    }

    fn encode_payload(&self) -> IndexResult<Vec<u8>> {
        let to_u32 = |value: usize, what: &str| {
            u32::try_from(value)
                .map_err(|_| IndexError::General(format!("{what} {value} does not fit in u32")))
        };

        let d = self.dimension.get();
        let mut payload = Vec::with_capacity(
            20 + self.centroids.len() * d * 4 + self.assignments.len() * 5,
        );
        payload.extend_from_slice(&to_u32(self.params.nlist, "nlist")?.to_le_bytes());
        payload.extend_from_slice(&to_u32(self.params.nprobe, "nprobe")?.to_le_bytes());
        payload.extend_from_slice(&self.params.seed.to_le_bytes());
        payload.extend_from_slice(&to_u32(self.centroids.len(), "cell count")?.to_le_bytes());
        for centroid in &self.centroids {
            for &value in centroid {
                payload.extend_from_slice(&value.to_le_bytes());
            }
        }
        for &cell in &self.assignments {
            payload.extend_from_slice(&cell.to_le_bytes());
        }
        payload.extend(self.tombstones.iter().map(|&removed| u8::from(removed)));
        Ok(payload)
    }

    pub(crate) fn from_snapshot(path: &Path, snapshot: Snapshot) -> IndexResult<Self> {
        let corrupt = |reason: String| IndexError::SnapshotCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        if snapshot.kind != IndexKind::Ivf {
            return Err(corrupt(format!(
                "expected an ivf snapshot, found {}",
                snapshot.kind
            )));
        }

        let count = snapshot.vectors.len();
        let d = snapshot.dimension.get();
        let mut reader = ByteReader::new(&snapshot.payload);

        let nlist = reader.read_u32().map_err(&corrupt)? as usize;
        let nprobe = reader.read_u32().map_err(&corrupt)? as usize;
        let seed = reader.read_u64().map_err(&corrupt)?;
        let cell_count = reader.read_u32().map_err(&corrupt)? as usize;
        if nlist == 0 || nprobe == 0 {
            return Err(corrupt("nlist and nprobe must be positive".to_string()));
        }
        if cell_count > count || (count > 0 && cell_count == 0) {
            return Err(corrupt(format!(
                "{cell_count} cells for {count} vectors"
            )));
        }

        let mut centroids = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            centroids.push(reader.read_f32s(d).map_err(&corrupt)?);
        }

        let mut assignments = Vec::with_capacity(count);
        for _ in 0..count {
            let cell = reader.read_u32().map_err(&corrupt)?;
            if cell as usize >= cell_count {
                return Err(corrupt(format!("assignment to unknown cell {cell}")));
            }
            assignments.push(cell);
        }

        let mut tombstones = Vec::with_capacity(count);
        for _ in 0..count {
            match reader.read_u8().map_err(&corrupt)? {
                0 => tombstones.push(false),
                1 => tombstones.push(true),
                other => return Err(corrupt(format!("invalid tombstone byte {other}"))),
            }
        }
        reader.finish().map_err(&corrupt)?;

        let live = tombstones.iter().filter(|&&removed| !removed).count();
        let cells = Self::group_cells(cell_count, &assignments);

        Ok(Self {
            dimension: snapshot.dimension,
            params: IvfParams {
                nlist,
                nprobe,
                seed,
            },
            vectors: snapshot.vectors,
            centroids,
            assignments,
            cells,
            tombstones,
            live,
        })
    }
}

impl SimilarityIndex for IvfFlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Ivf
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn size(&self) -> usize {
        self.vectors.len()
    }

    /// Appends the vectors and retrains the cells over the whole set.
    fn build(&mut self, vectors: &[Vec<f32>]) -> IndexResult<()> {
        validate_batch(self.dimension, self.vectors.len(), vectors)?;
        if vectors.is_empty() {
            return Ok(());
        }

        let total = self.vectors.len() + vectors.len();
        let cell_count = self.params.nlist.clamp(1, total);
        let refs: Vec<&[f32]> = self
            .vectors
            .iter()
            .chain(vectors.iter())
            .map(Vec::as_slice)
            .collect();

        // Train before touching any field so a failure leaves the index as is.
        let clustering = kmeans_clustering(&refs, cell_count, self.params.seed)
            .map_err(|e| IndexError::General(e.to_string()))?;
        tracing::debug!(
            "Trained {cell_count} cells over {total} vectors in {} iterations",
            clustering.iterations
        );

        self.vectors.extend_from_slice(vectors);
        self.tombstones.resize(total, false);
        self.live += vectors.len();
        self.cells = Self::group_cells(cell_count, &clustering.assignments);
        self.centroids = clustering.centroids;
        self.assignments = clustering.assignments;
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> IndexResult<Vec<SearchHit>> {
        validate_query(self.dimension, vector, self.live)?;
        let k = k.min(self.live);

        let probe = self.params.nprobe.min(self.centroids.len());
        let candidates: Vec<(u32, &[f32])> = nearest_centroids(vector, &self.centroids, probe)
            .into_iter()
            .flat_map(|cell| self.cells[cell as usize].iter().copied())
            .filter(|&position| !self.tombstones[position as usize])
            .map(|position| (position, self.vectors[position as usize].as_slice()))
            .collect();

        Ok(top_k(vector, candidates.into_par_iter(), k))
    }

    fn persist(&self, path: &Path) -> IndexResult<()> {
        let payload = self.encode_payload()?;
        snapshot::write_snapshot(path, IndexKind::Ivf, self.dimension, &self.vectors, &payload)
    }

    fn load(&mut self, path: &Path) -> IndexResult<()> {
        let snapshot = snapshot::read_snapshot(path)?;
        *self = Self::from_snapshot(path, snapshot)?;
        Ok(())
    }

    fn remove(&mut self, position: Position) -> IndexResult<()> {
        match self.tombstones.get_mut(position.index()) {
            Some(removed) if !*removed => {
                *removed = true;
                self.live -= 1;
                Ok(())
            }
            _ => Err(IndexError::InvalidPosition { position }),
        }
    }
}
