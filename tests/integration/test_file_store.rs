//! File-backed store: ordering, replacement and on-disk validation.

use crate::common::{FakeEncoder, TestWorkspace, manifests};
use std::fs;
use vidsearch::store::{CATALOG_FILE, StoreError, VECTORS_FILE};
use vidsearch::{
    EntityId, EntityVectors, FileVectorStore, IngestManifest, MetadataStore, VectorKind,
    VectorStore, encode_manifest,
};

fn entity(id: &str, frames: &[[f32; 2]]) -> EntityVectors {
    let mut entity = EntityVectors::new(EntityId::new(id), format!("https://host/v/{id}/watch"));
    for frame in frames {
        entity = entity.with_vector(VectorKind::Video, frame.to_vec());
    }
    entity
}

#[test]
fn test_ingested_manifest_round_trips_through_disk() {
    let workspace = TestWorkspace::new();
    let manifest = IngestManifest::from_json(manifests::THREE_VIDEOS).unwrap();
    let (entities, stats) = encode_manifest(&manifest, &FakeEncoder, workspace.path()).unwrap();
    assert_eq!(stats.videos, 3);
    assert_eq!(stats.frames_encoded, 4);
    assert_eq!(stats.texts_encoded, 5);

    let store = FileVectorStore::new(workspace.store_dir());
    let summary = store.upsert(entities).unwrap();
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.vectors_written, 9);
    assert!(store.root().join(CATALOG_FILE).exists());
    assert!(store.root().join(VECTORS_FILE).exists());

    let records = store.load_all().unwrap();
    let layout: Vec<(&str, VectorKind)> = records
        .iter()
        .map(|record| (record.entity_id.as_str(), record.kind))
        .collect();
    assert_eq!(
        layout[..4],
        [
            ("car-chase", VectorKind::Video),
            ("car-chase", VectorKind::Video),
            ("car-chase", VectorKind::Description),
            ("car-chase", VectorKind::Subtitle),
        ]
    );
    assert_eq!(layout[4..7].iter().filter(|(id, _)| *id == "pasta").count(), 3);

    let urls = store.read_catalog().unwrap().url_table();
    assert_eq!(
        urls.url(&EntityId::new("concert")).as_deref(),
        Some("https://videos.example.com/watch/concert/index.html")
    );
}

#[test]
fn test_upsert_replaces_in_place() {
    let workspace = TestWorkspace::new();
    let store = FileVectorStore::new(workspace.store_dir());
    store
        .upsert(vec![
            entity("a", &[[0.0, 0.0]]),
            entity("b", &[[1.0, 1.0]]),
            entity("c", &[[2.0, 2.0]]),
        ])
        .unwrap();

    let summary = store
        .upsert(vec![entity("b", &[[5.0, 5.0], [6.0, 6.0]])])
        .unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.replaced, 1);

    let ids: Vec<String> = store
        .load_all()
        .unwrap()
        .iter()
        .map(|record| record.entity_id.as_str().to_string())
        .collect();
    assert_eq!(ids, ["a", "b", "b", "c"]);
}

#[test]
fn test_truncated_vectors_file_is_rejected() {
    let workspace = TestWorkspace::new();
    let store = FileVectorStore::new(workspace.store_dir());
    store
        .upsert(vec![entity("a", &[[0.0, 1.0], [2.0, 3.0]])])
        .unwrap();

    let path = store.root().join(VECTORS_FILE);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    assert!(matches!(
        store.load_all(),
        Err(StoreError::InvalidFormat(_))
    ));
}

#[test]
fn test_wrong_dimension_leaves_store_untouched() {
    let workspace = TestWorkspace::new();
    let store = FileVectorStore::new(workspace.store_dir());
    store.upsert(vec![entity("a", &[[0.0, 1.0]])]).unwrap();

    let wide = EntityVectors::new(EntityId::new("w"), "https://host/v/w/watch")
        .with_vector(VectorKind::Video, vec![0.0, 1.0, 2.0]);
    assert!(store.upsert(vec![wide]).is_err());
    assert_eq!(store.load_all().unwrap().len(), 1);
}
