//! Type-safe wrappers and core types for the vector layer.
//!
//! Newtypes keep entity ids, index positions and dimensions from being
//! mixed up with plain strings and integers across the store, the index and
//! the ranking code.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Output dimension of the CLIP ViT-B/32 text and image towers.
pub const VECTOR_DIMENSION_512: usize = 512;

/// Stable identifier of a searchable entity (a video).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an id from a video URL.
    ///
    /// The id is the second-to-last non-empty path segment, so
    /// `https://host/video/abc123/watch/` resolves to `abc123`. Returns
    /// `None` when the URL has fewer than two path segments after the host.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
        let segments: Vec<&str> = without_scheme
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        // First segment is the host.
        if segments.len() < 3 {
            return None;
        }
        Some(Self::new(segments[segments.len() - 2]))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Modality a vector was derived from.
///
/// The declaration order is the enumeration order inside one entity:
/// frames first, then description, subtitles and audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    Video,
    Description,
    Subtitle,
    Audio,
}

impl VectorKind {
    /// All kinds in enumeration order.
    pub const ALL: [VectorKind; 4] = [
        VectorKind::Video,
        VectorKind::Description,
        VectorKind::Subtitle,
        VectorKind::Audio,
    ];

    /// Whether an entity may own more than one vector of this kind.
    #[must_use]
    pub const fn allows_many(self) -> bool {
        matches!(self, VectorKind::Video)
    }

    /// Stable on-disk tag.
    #[must_use]
    pub const fn to_tag(self) -> u32 {
        match self {
            VectorKind::Video => 0,
            VectorKind::Description => 1,
            VectorKind::Subtitle => 2,
            VectorKind::Audio => 3,
        }
    }

    /// Parses an on-disk tag.
    #[must_use]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(VectorKind::Video),
            1 => Some(VectorKind::Description),
            2 => Some(VectorKind::Subtitle),
            3 => Some(VectorKind::Audio),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            VectorKind::Video => "video",
            VectorKind::Description => "description",
            VectorKind::Subtitle => "subtitle",
            VectorKind::Audio => "audio",
        }
    }
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dense insertion rank of a vector inside one index.
///
/// Positions start at zero and are never reused or renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(u32);

impl Position {
    #[must_use]
    pub const fn new(position: u32) -> Self {
        Self(position)
    }

    /// Converts a slice index into a position.
    ///
    /// Returns `None` when the index does not fit the on-disk width.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the position as a slice index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for vector dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Dimension produced by CLIP ViT-B/32.
    #[must_use]
    pub const fn dimension_512() -> Self {
        Self(VECTOR_DIMENSION_512)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(value: VectorDimension) -> Self {
        value.0
    }
}

/// One stored vector tagged with its owner and modality.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub entity_id: EntityId,
    pub kind: VectorKind,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    #[must_use]
    pub fn new(entity_id: EntityId, kind: VectorKind, vector: Vec<f32>) -> Self {
        Self {
            entity_id,
            kind,
            vector,
        }
    }
}

/// Squared Euclidean distance between two vectors of equal length.
#[inline]
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid weight for {kind}: {value}\nReason: {reason}")]
    InvalidWeight {
        kind: VectorKind,
        value: f64,
        reason: &'static str,
    },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EncodingFailed(String),

    #[error(
        "Clustering failed: {0}\nSuggestion: Ensure sufficient vectors are available for clustering (minimum: k clusters)"
    )]
    ClusteringFailed(String),
}
