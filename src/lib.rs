/// The main library module for vidsearch
pub mod config;
pub mod display;
pub mod error;
pub mod index;
pub mod ingest;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod rank;
pub mod store;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use index::{
    FlatIndex, IndexKind, IndexManifest, IvfFlatIndex, IvfParams, LoadedIndex, SearchHit,
    SharedIndex, SimilarityIndex,
};
pub use ingest::{IngestManifest, IngestStats, encode_manifest};
pub use pipeline::{BuildOptions, IndexBuilder, SearchOptions, SearchPipeline};
pub use rank::{RankedResult, RankingPolicy, RepeatPolicy, WeightTable};
pub use store::{EntityVectors, FileVectorStore, MetadataStore, UrlTable, VectorStore};
pub use vector::{EntityId, Encoder, VectorDimension, VectorError, VectorKind, VectorRecord};
