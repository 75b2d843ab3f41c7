//! Snapshot persistence across both index variants.

use crate::common::grid_vectors;
use std::fs;
use vidsearch::index::{
    FlatIndex, IndexKind, IvfFlatIndex, IvfParams, SharedIndex, open_snapshot,
};
use vidsearch::vector::{Position, VectorDimension};
use vidsearch::{IndexError, LoadedIndex, SimilarityIndex};
use tempfile::TempDir;

const DIM: usize = 6;

fn dimension() -> VectorDimension {
    VectorDimension::new(DIM).unwrap()
}

fn params() -> IvfParams {
    IvfParams {
        nlist: 4,
        nprobe: 2,
        seed: 11,
    }
}

#[test]
fn test_both_variants_answer_identically_after_reload() {
    let temp = TempDir::new().unwrap();
    let vectors = grid_vectors(40, DIM);
    let queries = grid_vectors(5, DIM);

    let mut flat = FlatIndex::new(dimension());
    flat.build(&vectors).unwrap();
    let mut ivf = IvfFlatIndex::new(dimension(), params());
    ivf.build(&vectors).unwrap();

    let indexes: [(&str, &dyn SimilarityIndex); 2] = [("flat.snap", &flat), ("ivf.snap", &ivf)];
    for (name, index) in indexes {
        let path = temp.path().join(name);
        index.persist(&path).unwrap();

        let reopened = open_snapshot(&path).unwrap();
        assert_eq!(reopened.kind(), index.kind());
        assert_eq!(reopened.size(), index.size());
        for query in &queries {
            assert_eq!(
                reopened.query(query, 7).unwrap(),
                index.query(query, 7).unwrap(),
                "{name}"
            );
        }
    }
}

#[test]
fn test_every_flipped_byte_is_detected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flat.snap");
    let mut flat = FlatIndex::new(dimension());
    flat.build(&grid_vectors(3, DIM)).unwrap();
    flat.persist(&path).unwrap();
    let pristine = fs::read(&path).unwrap();

    for offset in (0..pristine.len()).step_by(5) {
        let mut bytes = pristine.clone();
        bytes[offset] ^= 0x40;
        fs::write(&path, &bytes).unwrap();

        let mut target = FlatIndex::new(dimension());
        target.build(&grid_vectors(1, DIM)).unwrap();
        let err = target.load(&path).unwrap_err();
        assert!(
            matches!(err, IndexError::SnapshotCorrupt { .. }),
            "offset {offset}: {err:?}"
        );
        assert_eq!(target.size(), 1, "offset {offset}");
    }
}

#[test]
fn test_truncated_snapshot_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ivf.snap");
    let mut ivf = IvfFlatIndex::new(dimension(), params());
    ivf.build(&grid_vectors(12, DIM)).unwrap();
    ivf.persist(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(
        open_snapshot(&path),
        Err(IndexError::SnapshotCorrupt { .. })
    ));
}

#[test]
fn test_removed_positions_stay_removed_after_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ivf.snap");
    let vectors = grid_vectors(10, DIM);

    let mut ivf = IvfFlatIndex::new(dimension(), IvfParams { nprobe: 4, ..params() });
    ivf.build(&vectors).unwrap();
    ivf.remove(Position::new(3)).unwrap();
    ivf.persist(&path).unwrap();

    let mut reloaded = IvfFlatIndex::new(dimension(), params());
    reloaded.load(&path).unwrap();
    assert_eq!(reloaded.size(), 10);
    assert!(reloaded.is_removed(Position::new(3)));

    let hits = reloaded.query(&vectors[3], 10).unwrap();
    assert_eq!(hits.len(), 9);
    assert!(hits.iter().all(|hit| hit.position != Position::new(3)));
    assert!(matches!(
        reloaded.remove(Position::new(3)),
        Err(IndexError::InvalidPosition { .. })
    ));
}

#[test]
fn test_shared_index_reload_swaps_contents() {
    let temp = TempDir::new().unwrap();
    let vectors = grid_vectors(4, DIM);

    let mut small = FlatIndex::new(dimension());
    small.build(&vectors[..2]).unwrap();
    let mut entries = vidsearch::index::EntryTable::new();
    for i in 0..2 {
        entries.push(
            vidsearch::EntityId::new(format!("v{i}")),
            vidsearch::VectorKind::Video,
        );
    }
    let mut loaded = LoadedIndex {
        index: Box::new(small),
        manifest: vidsearch::IndexManifest::new(IndexKind::Flat, "fake", DIM, entries),
        dir: temp.path().to_path_buf(),
    };
    loaded.persist(temp.path()).unwrap();

    let shared = SharedIndex::new(LoadedIndex::open(temp.path()).unwrap());
    assert_eq!(shared.read().index.size(), 2);

    let mut larger = FlatIndex::new(dimension());
    larger.build(&vectors).unwrap();
    let mut entries = vidsearch::index::EntryTable::new();
    for i in 0..4 {
        entries.push(
            vidsearch::EntityId::new(format!("v{i}")),
            vidsearch::VectorKind::Video,
        );
    }
    LoadedIndex {
        index: Box::new(larger),
        manifest: vidsearch::IndexManifest::new(IndexKind::Flat, "fake", DIM, entries),
        dir: temp.path().to_path_buf(),
    }
    .persist(temp.path())
    .unwrap();

    shared.reload(temp.path()).unwrap();
    assert_eq!(shared.read().index.size(), 4);
}
