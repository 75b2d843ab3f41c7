#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vidsearch::vector::{Encoder, VectorDimension, VectorError};

/// Topics the fake encoder knows, one axis each.
pub const TOPICS: [&str; 4] = ["cars", "cooking", "music", "news"];

pub const FAKE_DIMENSION: usize = TOPICS.len();

/// Deterministic encoder: every known topic word found in the input adds
/// 1.0 on its axis. Frames are encoded from their file name.
pub struct FakeEncoder;

impl FakeEncoder {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        TOPICS
            .iter()
            .map(|topic| if lower.contains(topic) { 1.0 } else { 0.0 })
            .collect()
    }
}

impl Encoder for FakeEncoder {
    fn encode_text(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        Ok(Self::vector_for(text))
    }

    fn encode_images(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(paths
            .iter()
            .map(|path| {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                Self::vector_for(name.as_deref().unwrap_or_default())
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(FAKE_DIMENSION).expect("non-zero dimension")
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

/// Isolated workspace with a store and an index directory.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn store_dir(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn index_dir(&self) -> PathBuf {
        let dir = self.dir.path().join("index");
        fs::create_dir_all(&dir).expect("Failed to create index dir");
        dir
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }
}

pub mod manifests {
    /// Three videos, each clearly about one topic.
    pub const THREE_VIDEOS: &str = r#"{
  "videos": [
    {
      "url": "https://videos.example.com/watch/car-chase/index.html",
      "frames": ["frames/cars_001.jpg", "frames/cars_002.jpg"],
      "description": "A night of street racing cars",
      "subtitles": "engines roaring"
    },
    {
      "url": "https://videos.example.com/watch/pasta/index.html",
      "frames": ["frames/cooking_001.jpg"],
      "description": "Cooking fresh pasta at home",
      "audio_transcript": "today we are cooking"
    },
    {
      "url": "https://videos.example.com/watch/concert/index.html",
      "frames": ["frames/music_001.jpg"],
      "description": "Live music from the festival"
    }
  ]
}"#;

    /// A replacement for the pasta video, now about news.
    pub const PASTA_REPLACED: &str = r#"{
  "videos": [
    {
      "url": "https://videos.example.com/watch/pasta/index.html",
      "frames": ["frames/news_001.jpg"],
      "description": "Evening news bulletin"
    }
  ]
}"#;
}

/// Deterministic pseudo-random vectors for snapshot tests.
pub fn grid_vectors(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|i| {
            (0..dimension)
                .map(|j| (((i * 31 + j * 17) % 23) as f32) / 7.0)
                .collect()
        })
        .collect()
}
