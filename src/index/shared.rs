//! Thread-safe handle to a loaded index.

use super::LoadedIndex;
use crate::error::IndexResult;
use parking_lot::{RwLock, RwLockReadGuard};
use std::path::Path;
use std::sync::Arc;

/// Many readers query concurrently; a reload takes the write lock.
#[derive(Clone)]
pub struct SharedIndex {
    inner: Arc<RwLock<LoadedIndex>>,
}

impl SharedIndex {
    #[must_use]
    pub fn new(loaded: LoadedIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(loaded)),
        }
    }

    /// Shared access for queries.
    pub fn read(&self) -> RwLockReadGuard<'_, LoadedIndex> {
        self.inner.read()
    }

    /// Swaps in a freshly built index.
    pub fn replace(&self, loaded: LoadedIndex) {
        *self.inner.write() = loaded;
    }

    /// Re-opens the index from `dir`. The current index stays in place if
    /// opening fails.
    pub fn reload(&self, dir: &Path) -> IndexResult<()> {
        let loaded = LoadedIndex::open(dir)?;
        self.replace(loaded);
        Ok(())
    }
}

impl std::fmt::Debug for SharedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_read() {
            Some(loaded) => write!(f, "SharedIndex {{ index: {:?} }}", loaded.index),
            None => write!(f, "SharedIndex {{ <locked> }}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{EntryTable, FlatIndex, IndexKind, IndexManifest, SimilarityIndex};
    use crate::vector::{EntityId, VectorDimension, VectorKind};
    use std::path::PathBuf;
    use std::thread;
    use tempfile::TempDir;

    fn loaded(vectors: &[Vec<f32>]) -> LoadedIndex {
        let mut index = FlatIndex::new(VectorDimension::new(2).unwrap());
        index.build(vectors).unwrap();
        let mut entries = EntryTable::new();
        for i in 0..vectors.len() {
            entries.push(EntityId::new(format!("e{i}")), VectorKind::Video);
        }
        LoadedIndex {
            index: Box::new(index),
            manifest: IndexManifest::new(IndexKind::Flat, "mock", 2, entries),
            dir: PathBuf::new(),
        }
    }

    #[test]
    fn test_concurrent_reads() {
        let shared = SharedIndex::new(loaded(&[vec![0.0, 0.0], vec![1.0, 1.0]]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || shared.read().index.query(&[1.0, 1.0], 1).unwrap()[0].position)
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().get(), 1);
        }
    }

    #[test]
    fn test_failed_reload_keeps_current_index() {
        let temp_dir = TempDir::new().unwrap();
        let shared = SharedIndex::new(loaded(&[vec![0.0, 0.0]]));

        assert!(shared.reload(temp_dir.path()).is_err());
        assert_eq!(shared.read().index.size(), 1);

        loaded(&[vec![0.0, 0.0], vec![2.0, 2.0], vec![3.0, 3.0]])
            .persist(temp_dir.path())
            .unwrap();
        shared.reload(temp_dir.path()).unwrap();
        assert_eq!(shared.read().index.size(), 3);
    }
}
