//! End-to-end: manifest -> store -> index -> ranked results.

use crate::common::{FakeEncoder, TestWorkspace, manifests};
use vidsearch::index::{IndexKind, IvfParams, LoadedIndex};
use vidsearch::io::{ExitCode, JsonResponse};
use vidsearch::{
    BuildOptions, FileVectorStore, IndexBuilder, IndexError, IngestManifest, RankedResult,
    RankingPolicy, RepeatPolicy, SearchOptions, SearchPipeline, WeightTable, encode_manifest,
};

fn ingest(workspace: &TestWorkspace, manifest_json: &str) -> FileVectorStore {
    let manifest = IngestManifest::from_json(manifest_json).unwrap();
    let (entities, _) = encode_manifest(&manifest, &FakeEncoder, workspace.path()).unwrap();
    let store = FileVectorStore::new(workspace.store_dir());
    store.upsert(entities).unwrap();
    store
}

fn build_and_open(workspace: &TestWorkspace, store: &FileVectorStore, options: &BuildOptions) -> LoadedIndex {
    let mut built = IndexBuilder::build_from_store(store, options).unwrap();
    let dir = workspace.index_dir();
    built.persist(&dir).unwrap();
    LoadedIndex::open(&dir).unwrap()
}

fn search(
    loaded: &LoadedIndex,
    store: &FileVectorStore,
    query: &str,
    options: SearchOptions,
) -> Vec<RankedResult> {
    let urls = store.read_catalog().unwrap().url_table();
    let weights = WeightTable::default();
    SearchPipeline::new(
        &FakeEncoder,
        loaded.index.as_ref(),
        loaded.entries(),
        &urls,
        &weights,
        options,
    )
    .search(query)
    .unwrap()
}

#[test]
fn test_text_query_ranks_matching_video_first() {
    let workspace = TestWorkspace::new();
    let store = ingest(&workspace, manifests::THREE_VIDEOS);
    let loaded = build_and_open(&workspace, &store, &BuildOptions::default());

    assert_eq!(loaded.index.size(), 9);
    assert_eq!(loaded.entries().entity_count(), 3);

    let results = search(&loaded, &store, "fast cars", SearchOptions::default());
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].entity_id.as_str(), "car-chase");
    assert_eq!(
        results[0].url,
        "https://videos.example.com/watch/car-chase/index.html"
    );
    // Two frames and the description match exactly, the subtitle is 1.0 away.
    assert!((results[0].score - 0.1 / 1.4).abs() < 1e-9);
    for other in &results[1..] {
        assert!((other.score - 2.0).abs() < 1e-9);
    }
}

#[test]
fn test_top_n_and_nearest_only() {
    let workspace = TestWorkspace::new();
    let store = ingest(&workspace, manifests::THREE_VIDEOS);
    let loaded = build_and_open(&workspace, &store, &BuildOptions::default());

    let options = SearchOptions {
        top_n: 1,
        repeat: RepeatPolicy::NearestOnly,
        ..SearchOptions::default()
    };
    let results = search(&loaded, &store, "cooking show", options);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entity_id.as_str(), "pasta");
    assert_eq!(results[0].score, 0.0);
}

#[test]
fn test_most_hits_prefers_videos_with_more_neighbors() {
    let workspace = TestWorkspace::new();
    let store = ingest(&workspace, manifests::THREE_VIDEOS);
    let loaded = build_and_open(&workspace, &store, &BuildOptions::default());

    let options = SearchOptions {
        ranking: RankingPolicy::MostHits,
        ..SearchOptions::default()
    };
    // With every vector fetched, car-chase has four hits, pasta three and
    // concert two, even though concert matches exactly.
    let results = search(&loaded, &store, "music", options);
    let ranked: Vec<(&str, u32)> = results
        .iter()
        .map(|r| (r.entity_id.as_str(), r.hits))
        .collect();
    assert_eq!(ranked, [("car-chase", 4), ("pasta", 3), ("concert", 2)]);
    assert!((results[0].score - 7.0).abs() < 1e-9);
    assert_eq!(results[2].score, 0.0);

    // With three hits, concert's two exact matches outnumber car-chase's
    // subtitle.
    let results = search(&loaded, &store, "music", SearchOptions { k: 3, ..options });
    let ranked: Vec<(&str, u32)> = results
        .iter()
        .map(|r| (r.entity_id.as_str(), r.hits))
        .collect();
    assert_eq!(ranked, [("concert", 2), ("car-chase", 1)]);

    let weighted = search(&loaded, &store, "music", SearchOptions::default());
    assert_eq!(weighted[0].entity_id.as_str(), "concert");
}

#[test]
fn test_ivf_probing_every_cell_matches_flat() {
    let workspace = TestWorkspace::new();
    let store = ingest(&workspace, manifests::THREE_VIDEOS);

    let flat = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();
    let ivf_options = BuildOptions {
        kind: IndexKind::Ivf,
        ivf: IvfParams {
            nlist: 3,
            nprobe: 3,
            seed: 7,
        },
        ..BuildOptions::default()
    };
    let ivf = build_and_open(&workspace, &store, &ivf_options);
    assert_eq!(ivf.manifest.index_kind, IndexKind::Ivf);

    for query in ["cars", "music", "news"] {
        let expected = search(&flat, &store, query, SearchOptions::default());
        let actual = search(&ivf, &store, query, SearchOptions::default());
        assert_eq!(expected, actual, "query {query}");
    }
}

#[test]
fn test_reingest_keeps_positions_of_untouched_videos() {
    let workspace = TestWorkspace::new();
    let store = ingest(&workspace, manifests::THREE_VIDEOS);
    let before = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();

    ingest(&workspace, manifests::PASTA_REPLACED);
    let after = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();

    let ids = |loaded: &LoadedIndex| -> Vec<String> {
        loaded
            .entries()
            .iter()
            .map(|entry| entry.entity_id.as_str().to_string())
            .collect()
    };
    let before_ids = ids(&before);
    let after_ids = ids(&after);

    // car-chase keeps the first four positions, concert stays last.
    assert_eq!(before_ids[..4], after_ids[..4]);
    assert_eq!(before_ids.last(), after_ids.last());
    assert_eq!(after_ids.iter().filter(|id| *id == "pasta").count(), 2);

    let results = search(&after, &store, "news", SearchOptions::default());
    assert_eq!(results[0].entity_id.as_str(), "pasta");
}

#[test]
fn test_identical_builds_assign_identical_positions() {
    let workspace = TestWorkspace::new();
    let store = ingest(&workspace, manifests::THREE_VIDEOS);

    let first = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();
    let second = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap();
    assert_eq!(first.manifest.entries, second.manifest.entries);
}

#[test]
fn test_missing_store_is_unavailable() {
    let workspace = TestWorkspace::new();
    let store = FileVectorStore::new(workspace.store_dir());

    let err = IndexBuilder::build_from_store(&store, &BuildOptions::default()).unwrap_err();
    assert!(matches!(err, IndexError::StoreUnavailable { .. }));
    assert_eq!(ExitCode::from_error(&err), ExitCode::IoError);
}

#[test]
fn test_missing_index_is_empty_and_reported_as_json() {
    let workspace = TestWorkspace::new();
    let err = LoadedIndex::open(&workspace.index_dir()).unwrap_err();
    assert!(matches!(err, IndexError::EmptyIndex));

    let response = JsonResponse::from_error(&err);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["code"], "EMPTY_INDEX");
    assert_eq!(json["exit_code"], 3);
}
