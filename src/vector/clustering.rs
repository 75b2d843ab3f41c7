//! K-means clustering for the IVF-flat index variant.
//!
//! Partitions the stored vectors into cells so a query only has to scan
//! the members of its nearest cells.
//!
//! # Algorithm Details
//! - Distance metric: squared Euclidean, the same metric the index ranks by
//! - Initialization: K-means++ driven by a seeded RNG, so two builds over the
//!   same input produce the same cells
//! - Max iterations: 100
//! - Convergence tolerance: 1e-4

use crate::vector::types::{VectorError, squared_l2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Maximum number of iterations for K-means clustering.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid updates.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cell centroids, each of the same dimension as the input vectors.
    pub centroids: Vec<Vec<f32>>,

    /// Zero-based cell index for each input vector.
    pub assignments: Vec<u32>,

    /// Number of iterations until convergence.
    pub iterations: usize,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are loaded before clustering"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error(
        "Failed to initialize centroids\nSuggestion: Check that vectors contain valid floating-point values"
    )]
    InitializationFailed,
}

impl From<ClusteringError> for VectorError {
    fn from(err: ClusteringError) -> Self {
        VectorError::ClusteringFailed(err.to_string())
    }
}

/// Performs K-means clustering with squared Euclidean distance.
///
/// # Arguments
/// * `vectors` - Input vectors (non-empty, same dimension)
/// * `k` - Number of cells (>= 1 and <= number of vectors)
/// * `seed` - RNG seed for K-means++ initialization
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(
    vectors: &[&[f32]],
    k: usize,
    seed: u64,
) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, &mut rng)?;
    let mut assignments = vec![u32::MAX; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let centroid_refs: Vec<&[f32]> = centroids.iter().map(|c| c.as_slice()).collect();
        let new_assignments: Vec<u32> = vectors
            .iter()
            .map(|vector| assign_to_nearest_centroid(vector, &centroid_refs))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, k, &mut rng);
        let centroid_movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if centroid_movement < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        tracing::warn!("K-means did not fully converge after {MAX_ITERATIONS} iterations");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Returns the zero-based index of the centroid nearest to `vector`.
///
/// Ties go to the lower index.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[&[f32]]) -> u32 {
    let mut best_distance = f32::INFINITY;
    let mut best_cell = 0usize;

    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_l2(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best_cell = i;
        }
    }

    best_cell as u32
}

/// Returns up to `nprobe` centroid indices ordered by distance to `vector`.
pub fn nearest_centroids(vector: &[f32], centroids: &[Vec<f32>], nprobe: usize) -> Vec<u32> {
    let mut ranked: Vec<(f32, u32)> = centroids
        .iter()
        .enumerate()
        .map(|(i, centroid)| (squared_l2(vector, centroid), i as u32))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked.truncate(nprobe);
    ranked.into_iter().map(|(_, cell)| cell).collect()
}

/// Recomputes centroids as the mean of their members.
fn update_centroids(
    vectors: &[&[f32]],
    assignments: &[u32],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, &cell) in vectors.iter().zip(assignments.iter()) {
        let cell = cell as usize;
        for (i, &value) in vector.iter().enumerate() {
            new_centroids[cell][i] += value;
        }
        cluster_sizes[cell] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            // Empty cell: reseed from a random member
            let random_idx = rng.random_range(0..vectors.len());
            *centroid = vectors[random_idx].to_vec();
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
        }
    }

    new_centroids
}

/// K-means++: picks initial centroids with probability proportional to
/// the squared distance to the nearest centroid chosen so far.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[&[f32]],
    k: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f32>>, ClusteringError> {
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(vectors[first_idx].to_vec());

    for _ in 1..k {
        let mut distances = vec![0.0f32; vectors.len()];
        let mut total_distance = 0.0f32;

        for (i, vector) in vectors.iter().enumerate() {
            let min_distance = centroids
                .iter()
                .map(|centroid| squared_l2(vector, centroid))
                .fold(f32::MAX, f32::min);
            distances[i] = min_distance;
            total_distance += min_distance;
        }

        if total_distance < EPSILON {
            // Every remaining vector coincides with a chosen centroid
            break;
        }

        let target = rng.random::<f32>() * total_distance;
        let mut cumulative = 0.0;
        let mut added = false;

        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if cumulative >= target && distance > 0.0 {
                centroids.push(vectors[i].to_vec());
                added = true;
                break;
            }
        }

        // Rounding can leave the target just past the last bucket
        if !added {
            if let Some(i) = distances.iter().rposition(|&d| d > 0.0) {
                centroids.push(vectors[i].to_vec());
            }
        }
    }

    // Duplicate-heavy inputs can yield fewer distinct seeds than requested;
    // pad with copies so every cell index stays valid.
    while centroids.len() < k {
        let Some(first) = centroids.first().cloned() else {
            return Err(ClusteringError::InitializationFailed);
        };
        centroids.push(first);
    }

    Ok(centroids)
}

/// Mean squared movement of centroids between iterations.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| squared_l2(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}
