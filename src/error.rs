//! Error types for the video search engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::store::StoreError;
use crate::vector::{Position, VectorError, VectorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for building, loading and querying an index
#[derive(Error, Debug)]
pub enum IndexError {
    /// The vector store could not be read
    #[error("Vector store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index is empty. Ingest some videos and run 'vidsearch build' first.")]
    EmptyIndex,

    #[error("Failed to encode query: {reason}")]
    EncodingFailed { reason: String },

    /// Snapshot or manifest failed validation on load
    #[error("Snapshot '{path}' is corrupt: {reason}")]
    SnapshotCorrupt { path: PathBuf, reason: String },

    #[error("Operation '{operation}' is not supported by the {index_kind} index")]
    Unsupported {
        operation: &'static str,
        index_kind: &'static str,
    },

    #[error("Position {position} is not part of the index")]
    InvalidPosition { position: Position },

    #[error("Index cannot hold {requested} vectors: positions are 32-bit")]
    CapacityExceeded { requested: usize },

    #[error("Invalid weight {value} for {kind}: {reason}")]
    InvalidWeight {
        kind: VectorKind,
        value: f64,
        reason: &'static str,
    },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to persist to '{path}': {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A manifest entry could not be turned into vectors
    #[error("Cannot ingest '{entry}': {reason}")]
    Ingest { entry: String, reason: String },

    /// General errors for cases that fit no other variant
    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::EmptyIndex => "EMPTY_INDEX",
            Self::EncodingFailed { .. } => "ENCODING_FAILED",
            Self::SnapshotCorrupt { .. } => "SNAPSHOT_CORRUPT",
            Self::Unsupported { .. } => "UNSUPPORTED",
            Self::InvalidPosition { .. } => "INVALID_POSITION",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::InvalidWeight { .. } => "INVALID_WEIGHT",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Ingest { .. } => "INGEST_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::StoreUnavailable { .. } => vec![
                "Check that store_path in .vidsearch/settings.toml points at an ingested store",
                "Run 'vidsearch ingest <manifest.json>' to create the store",
            ],
            Self::DimensionMismatch { .. } => vec![
                "All vectors must come from the same encoder model",
                "Re-ingest with the configured model and run 'vidsearch build --force'",
            ],
            Self::EmptyIndex => vec![
                "Run 'vidsearch ingest <manifest.json>' to add videos",
                "Run 'vidsearch build' after ingesting",
            ],
            Self::EncodingFailed { .. } => vec![
                "Check that the query text is not empty",
                "Ensure the encoder model could be downloaded to the cache directory",
            ],
            Self::SnapshotCorrupt { .. } => vec![
                "Run 'vidsearch build --force' to rebuild the index from the store",
                "Check for disk errors or filesystem corruption",
            ],
            Self::Unsupported { .. } => vec![
                "Use index.kind = \"ivf\" for an index that supports removal",
            ],
            Self::InvalidWeight { .. } => vec![
                "Weights must be finite numbers between 0.0 and 1.0",
            ],
            Self::CapacityExceeded { .. } => vec![
                "Split the collection across several stores and indexes",
            ],
            Self::Config { .. } => vec![
                "Check .vidsearch/settings.toml for syntax errors",
                "Run 'vidsearch init --force' to regenerate the default settings",
            ],
            Self::Persistence { .. } => vec![
                "Check disk space and permissions in the index directory",
            ],
            Self::Ingest { .. } => vec![
                "Every video needs a URL with at least two path segments, or an explicit id",
            ],
            _ => vec![],
        }
    }
}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Vector(inner) => inner.into(),
            other => IndexError::StoreUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

impl From<VectorError> for IndexError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                IndexError::DimensionMismatch { expected, actual }
            }
            VectorError::InvalidWeight {
                kind,
                value,
                reason,
            } => IndexError::InvalidWeight {
                kind,
                value,
                reason,
            },
            VectorError::EncodingFailed(reason) => IndexError::EncodingFailed { reason },
            other => IndexError::General(other.to_string()),
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
