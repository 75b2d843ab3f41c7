//! Vector primitives shared by the store, the index and the ranking code.
//!
//! # Architecture
//! Every stored vector is a [`VectorRecord`]: an owner [`EntityId`], a
//! [`VectorKind`] saying which modality it came from, and the raw values.
//! Distances are squared Euclidean throughout. The [`Encoder`] trait is the
//! only way vectors enter the system from text or images.

mod clustering;
mod encoder;
mod types;

// Re-export core types for public API
pub use clustering::{
    ClusteringError, KMeansResult, assign_to_nearest_centroid, kmeans_clustering,
    nearest_centroids,
};
#[cfg(test)]
pub use encoder::MockEncoder;
pub use encoder::{ClipEncoder, ClipModel, Encoder, model_to_string, parse_clip_model};
pub use types::{
    EntityId, Position, VECTOR_DIMENSION_512, VectorDimension, VectorError, VectorKind,
    VectorRecord, squared_l2,
};
