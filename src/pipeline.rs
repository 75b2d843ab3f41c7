//! Query-time search pipeline and build-time index construction.
//!
//! A search runs strictly in sequence on the calling thread:
//! `Idle -> Embedding -> Querying -> Aggregating -> Ranked -> Idle`.
//! The pipeline borrows every collaborator and keeps only per-query data,
//! so one instance can serve any number of queries from any thread.

use crate::error::{IndexError, IndexResult};
use crate::index::{
    EntryTable, IndexKind, IndexManifest, IvfParams, LoadedIndex, SimilarityIndex, new_index,
};
use crate::rank::{
    RankedResult, RankedResultBuilder, RankingPolicy, RepeatPolicy, WeightTable,
    WeightedAggregator, count_hits,
};
use crate::store::{MetadataStore, VectorStore};
use crate::vector::{Encoder, VectorDimension};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Per-query knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Raw nearest-neighbor hits fetched from the index
    pub k: usize,
    /// Entities returned after aggregation
    pub top_n: usize,
    pub repeat: RepeatPolicy,
    pub ranking: RankingPolicy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            k: 500,
            top_n: 10,
            repeat: RepeatPolicy::SumAll,
            ranking: RankingPolicy::Weighted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Embedding,
    Querying,
    Aggregating,
    Ranked,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Embedding => "embedding",
            PipelineStage::Querying => "querying",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Ranked => "ranked",
        };
        f.write_str(name)
    }
}

/// Logs stage transitions with the time spent in the stage being left.
struct StageClock {
    stage: PipelineStage,
    entered: Instant,
}

impl StageClock {
    fn start() -> Self {
        Self {
            stage: PipelineStage::Idle,
            entered: Instant::now(),
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        tracing::debug!(
            "[search] {} -> {next} after {:?}",
            self.stage,
            self.entered.elapsed()
        );
        self.stage = next;
        self.entered = Instant::now();
    }
}

/// Text query in, ranked entities out.
pub struct SearchPipeline<'a> {
    encoder: &'a dyn Encoder,
    index: &'a dyn SimilarityIndex,
    entries: &'a EntryTable,
    metadata: &'a dyn MetadataStore,
    weights: &'a WeightTable,
    options: SearchOptions,
}

impl<'a> SearchPipeline<'a> {
    #[must_use]
    pub fn new(
        encoder: &'a dyn Encoder,
        index: &'a dyn SimilarityIndex,
        entries: &'a EntryTable,
        metadata: &'a dyn MetadataStore,
        weights: &'a WeightTable,
        options: SearchOptions,
    ) -> Self {
        Self {
            encoder,
            index,
            entries,
            metadata,
            weights,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> SearchOptions {
        self.options
    }

    /// Runs one query end to end.
    pub fn search(&self, query: &str) -> IndexResult<Vec<RankedResult>> {
        let mut clock = StageClock::start();

        clock.advance(PipelineStage::Embedding);
        let vector = self.embed(query)?;

        self.rank(vector.as_slice(), &mut clock)
    }

    /// Runs a query whose vector is already known.
    pub fn search_vector(&self, vector: &[f32]) -> IndexResult<Vec<RankedResult>> {
        let mut clock = StageClock::start();
        self.rank(vector, &mut clock)
    }

    fn embed(&self, query: &str) -> IndexResult<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(IndexError::EncodingFailed {
                reason: "query text is empty".to_string(),
            });
        }

        let vector = self
            .encoder
            .encode_text(query)
            .map_err(|e| IndexError::EncodingFailed {
                reason: e.to_string(),
            })?;

        if vector.is_empty() {
            return Err(IndexError::EncodingFailed {
                reason: "encoder returned no vector".to_string(),
            });
        }
        Ok(vector)
    }

    fn rank(&self, vector: &[f32], clock: &mut StageClock) -> IndexResult<Vec<RankedResult>> {
        clock.advance(PipelineStage::Querying);
        let hits = self.index.query(vector, self.options.k)?;

        clock.advance(PipelineStage::Aggregating);
        let scores = match self.options.ranking {
            RankingPolicy::Weighted => WeightedAggregator::new(self.weights, self.options.repeat)
                .aggregate(&hits, self.entries)?,
            RankingPolicy::MostHits => count_hits(&hits, self.entries)?,
        };

        clock.advance(PipelineStage::Ranked);
        let results = RankedResultBuilder::build(
            scores,
            self.options.ranking,
            self.options.top_n,
            self.metadata,
        );

        tracing::debug!(
            "[search] {} hits aggregated into {} results",
            hits.len(),
            results.len()
        );
        clock.advance(PipelineStage::Idle);
        Ok(results)
    }
}

/// Settings for constructing an index from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub kind: IndexKind,
    pub ivf: IvfParams,
    /// Encoder model name recorded in the manifest
    pub model_name: String,
    /// Threads used for clustering and distance computation; 0 means rayon's default
    pub parallel_threads: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            kind: IndexKind::Flat,
            ivf: IvfParams::default(),
            model_name: String::new(),
            parallel_threads: 0,
        }
    }
}

/// Builds an index and its entry table from a vector store.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexBuilder;

impl IndexBuilder {
    /// Loads every record, appends them in store order and captures the
    /// entry table in the same order.
    ///
    /// Store failures are fatal and surface as `StoreUnavailable`; an empty
    /// store is `EmptyIndex`.
    pub fn build_from_store(
        store: &dyn VectorStore,
        options: &BuildOptions,
    ) -> IndexResult<LoadedIndex> {
        let start = Instant::now();
        let records = store
            .load_all()
            .map_err(|e| IndexError::StoreUnavailable {
                reason: e.to_string(),
            })?;

        let Some(first) = records.first() else {
            return Err(IndexError::EmptyIndex);
        };
        let dimension = VectorDimension::new(first.vector.len())?;

        let entries = EntryTable::from_records(&records);
        let vectors: Vec<Vec<f32>> = records.into_iter().map(|record| record.vector).collect();

        let mut index = new_index(options.kind, dimension, options.ivf);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.parallel_threads)
            .build()
            .map_err(|e| IndexError::General(format!("Failed to start build threads: {e}")))?;
        pool.install(|| index.build(&vectors))?;

        tracing::info!(
            "Built {} index over {} vectors of {} entities in {:?}",
            options.kind,
            index.size(),
            entries.entity_count(),
            start.elapsed()
        );

        let manifest =
            IndexManifest::new(options.kind, options.model_name.clone(), dimension.get(), entries);
        Ok(LoadedIndex {
            index,
            manifest,
            dir: PathBuf::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityVectors, InMemoryVectorStore, StoreError};
    use crate::vector::{EntityId, MockEncoder, VectorError, VectorKind, VectorRecord};

    struct FailingStore;

    impl VectorStore for FailingStore {
        fn load_all(&self) -> Result<Vec<VectorRecord>, StoreError> {
            Err(StoreError::Unavailable {
                path: PathBuf::from("/nowhere"),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct BrokenEncoder;

    impl Encoder for BrokenEncoder {
        fn encode_text(&self, _text: &str) -> Result<Vec<f32>, VectorError> {
            Err(VectorError::EncodingFailed("model crashed".to_string()))
        }

        fn encode_images(&self, _paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, VectorError> {
            Ok(Vec::new())
        }

        fn dimension(&self) -> VectorDimension {
            VectorDimension::new(2).unwrap()
        }

        fn model_name(&self) -> &str {
            "broken"
        }
    }

    fn sample_store(encoder: &MockEncoder) -> InMemoryVectorStore {
        let mut store = InMemoryVectorStore::new();
        store
            .insert(
                EntityVectors::new(EntityId::new("cats"), "https://example.com/cats")
                    .with_vector(VectorKind::Video, encoder.vector_for("cat playing"))
                    .with_vector(VectorKind::Description, encoder.vector_for("funny cats")),
            )
            .unwrap();
        store
            .insert(
                EntityVectors::new(EntityId::new("cars"), "https://example.com/cars")
                    .with_vector(VectorKind::Video, encoder.vector_for("race cars"))
                    .with_vector(VectorKind::Audio, encoder.vector_for("engine noise")),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_build_then_search_finds_exact_match_first() {
        let encoder = MockEncoder::with_dimension(VectorDimension::new(8).unwrap());
        let store = sample_store(&encoder);
        let loaded = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();
        assert_eq!(loaded.index.size(), 4);

        let weights = WeightTable::default();
        let pipeline = SearchPipeline::new(
            &encoder,
            loaded.index.as_ref(),
            loaded.entries(),
            &store,
            &weights,
            SearchOptions::default(),
        );

        let results = pipeline.search("race cars").unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score <= results[1].score);

        let nearest = SearchPipeline::new(
            &encoder,
            loaded.index.as_ref(),
            loaded.entries(),
            &store,
            &weights,
            SearchOptions {
                k: 1,
                ..SearchOptions::default()
            },
        );
        let results = nearest.search("race cars").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_id.as_str(), "cars");
        assert_eq!(results[0].url, "https://example.com/cars");
        assert_eq!(results[0].score, 0.0);
    }

    #[test]
    fn test_empty_query_is_rejected_before_encoding() {
        let encoder = MockEncoder::with_dimension(VectorDimension::new(8).unwrap());
        let store = sample_store(&encoder);
        let loaded = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();
        let weights = WeightTable::default();
        let pipeline = SearchPipeline::new(
            &encoder,
            loaded.index.as_ref(),
            loaded.entries(),
            &store,
            &weights,
            SearchOptions::default(),
        );

        assert!(matches!(
            pipeline.search("   "),
            Err(IndexError::EncodingFailed { .. })
        ));
    }

    #[test]
    fn test_encoder_failure_is_encoding_failed() {
        let encoder = MockEncoder::with_dimension(VectorDimension::new(8).unwrap());
        let store = sample_store(&encoder);
        let loaded = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();
        let weights = WeightTable::default();
        let pipeline = SearchPipeline::new(
            &BrokenEncoder,
            loaded.index.as_ref(),
            loaded.entries(),
            &store,
            &weights,
            SearchOptions::default(),
        );

        assert!(matches!(
            pipeline.search("cats"),
            Err(IndexError::EncodingFailed { .. })
        ));
        // The index is untouched and still answers vector queries.
        assert!(pipeline.search_vector(&encoder.vector_for("cats")).is_ok());
    }

    #[test]
    fn test_store_failure_and_empty_store() {
        assert!(matches!(
            IndexBuilder::build_from_store(&FailingStore, &BuildOptions::default()),
            Err(IndexError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            IndexBuilder::build_from_store(&InMemoryVectorStore::new(), &BuildOptions::default()),
            Err(IndexError::EmptyIndex)
        ));
    }

    #[test]
    fn test_two_builds_assign_identical_positions() {
        let encoder = MockEncoder::with_dimension(VectorDimension::new(8).unwrap());
        let store = sample_store(&encoder);
        let options = BuildOptions {
            kind: IndexKind::Ivf,
            ivf: IvfParams {
                nlist: 2,
                nprobe: 2,
                seed: 3,
            },
            ..BuildOptions::default()
        };

        let a = IndexBuilder::build_from_store(&store, &options).unwrap();
        let b = IndexBuilder::build_from_store(&store, &options).unwrap();
        assert_eq!(a.entries(), b.entries());

        let query = encoder.vector_for("cat");
        assert_eq!(
            a.index.query(&query, 4).unwrap(),
            b.index.query(&query, 4).unwrap()
        );
    }
}
