//! Configuration module for the video search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `VS_` and use double underscores
//! to separate nested levels:
//! - `VS_SEARCH__K=200` sets `search.k`
//! - `VS_WEIGHTS__AUDIO=0.3` sets `weights.audio`
//! - `VS_INDEX__KIND=ivf` sets `index.kind`

use crate::error::{IndexError, IndexResult};
use crate::index::{IndexKind, IvfParams};
use crate::pipeline::{BuildOptions, SearchOptions};
use crate::rank::{RankingPolicy, RepeatPolicy, WeightTable};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace configuration directory.
pub const CONFIG_DIR: &str = ".vidsearch";

/// Settings file inside [`CONFIG_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory of the vector store
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Directory of the built index
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Workspace root directory (where .vidsearch is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub search: SearchConfig,

    /// Per-kind ranking weights
    #[serde(default)]
    pub weights: WeightsConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Raw nearest-neighbor hits fetched per query
    #[serde(default = "default_k")]
    pub k: usize,

    /// Videos returned per query
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// How repeated hits of one kind for one video are counted
    #[serde(default)]
    pub repeat_hits: RepeatPolicy,

    /// How videos are ordered: weighted distance or most hits
    #[serde(default)]
    pub ranking: RankingPolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct WeightsConfig {
    #[serde(default = "default_video_weight")]
    pub video: f64,
    #[serde(default = "default_text_weight")]
    pub description: f64,
    #[serde(default = "default_text_weight")]
    pub subtitle: f64,
    #[serde(default = "default_audio_weight")]
    pub audio: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    /// Index variant: "flat" or "ivf"
    #[serde(default)]
    pub kind: IndexKind,

    /// Number of IVF cells
    #[serde(default = "default_nlist")]
    pub nlist: usize,

    /// IVF cells probed per query
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// Seed for IVF clustering
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of parallel threads for building
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Encoder model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Where model files are downloaded (defaults to the user cache directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Show a progress bar while downloading a model
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

fn default_version() -> u32 {
    1
}
fn default_store_path() -> PathBuf {
    PathBuf::from(".vidsearch/store")
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".vidsearch/index")
}
fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}
fn default_k() -> usize {
    500
}
fn default_top_n() -> usize {
    10
}
fn default_video_weight() -> f64 {
    0.6
}
fn default_text_weight() -> f64 {
    0.1
}
fn default_audio_weight() -> f64 {
    0.2
}
fn default_nlist() -> usize {
    100
}
fn default_nprobe() -> usize {
    8
}
fn default_seed() -> u64 {
    42
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_model() -> String {
    "ClipVitB32".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            store_path: default_store_path(),
            index_path: default_index_path(),
            workspace_root: None,
            debug: false,
            search: SearchConfig::default(),
            weights: WeightsConfig::default(),
            index: IndexConfig::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            top_n: default_top_n(),
            repeat_hits: RepeatPolicy::default(),
            ranking: RankingPolicy::default(),
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            video: default_video_weight(),
            description: default_text_weight(),
            subtitle: default_text_weight(),
            audio: default_audio_weight(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::default(),
            nlist: default_nlist(),
            nprobe: default_nprobe(),
            seed: default_seed(),
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            cache_dir: None,
            show_download_progress: true,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .vidsearch directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| Path::new(CONFIG_DIR).join(SETTINGS_FILE));

        Self::layered(&config_path).map(|mut settings| {
            // If workspace_root is not set in config, detect it
            if settings.workspace_root.is_none() {
                settings.workspace_root = Self::workspace_root();
            }
            settings
        })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::layered(path.as_ref())
    }

    fn layered(config_path: &Path) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("VS_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the workspace config by looking for a .vidsearch directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| Path::new(CONFIG_DIR).join(SETTINGS_FILE));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'vidsearch init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Get the workspace root directory (where .vidsearch is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = Path::new(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, Self::template())?;
        Ok(config_path)
    }

    /// The commented settings file written by `init`.
    #[must_use]
    pub fn template() -> String {
        format!(
            r#"# vidsearch configuration file

# Version of the configuration schema
version = 1

# Vector store and index directories (relative to the workspace root)
store_path = ".vidsearch/store"
index_path = ".vidsearch/index"

# Global debug mode
debug = false

[search]
# Raw nearest-neighbor hits fetched per query, before aggregation
k = 500

# Videos returned per query
top_n = 10

# How repeated hits of one kind for one video count:
# "sum_all" adds every hit, "nearest_only" keeps the nearest one
repeat_hits = "sum_all"

# "weighted" orders videos by weighted distance, "most_hits" by how many
# raw hits they received (then by summed distance)
ranking = "weighted"

[weights]
# Each weight must be between 0.0 and 1.0
video = 0.6
description = 0.1
subtitle = 0.1
audio = 0.2

[index]
# "flat" scans every vector; "ivf" probes k-means cells and supports removal
kind = "flat"

# IVF cells and cells probed per query
nlist = 100
nprobe = 8

# Seed for IVF clustering, for reproducible builds
seed = 42

# Number of parallel threads for building (defaults to CPU count)
# parallel_threads = {}

[encoder]
# Local CLIP model used for text queries and key frames
model = "ClipVitB32"

# Model download directory (defaults to the user cache directory)
# cache_dir = "~/.cache/vidsearch/models"

show_download_progress = true
"#,
            num_cpus::get()
        )
    }

    /// Resolves a configured path against the workspace root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.resolve(&self.store_path)
    }

    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.resolve(&self.index_path)
    }

    /// Model cache directory.
    #[must_use]
    pub fn model_cache_dir(&self) -> PathBuf {
        match &self.encoder.cache_dir {
            Some(dir) => self.resolve(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
                .join("vidsearch")
                .join("models"),
        }
    }

    /// Validates values serde cannot check.
    pub fn validate(&self) -> IndexResult<()> {
        self.weight_table()?;

        let positive = [
            ("search.k", self.search.k),
            ("search.top_n", self.search.top_n),
            ("index.nlist", self.index.nlist),
            ("index.nprobe", self.index.nprobe),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(IndexError::Config {
                    reason: format!("{name} must be at least 1"),
                });
            }
        }
        Ok(())
    }

    pub fn weight_table(&self) -> IndexResult<WeightTable> {
        let w = &self.weights;
        Ok(WeightTable::new(
            w.video,
            w.description,
            w.subtitle,
            w.audio,
        )?)
    }

    #[must_use]
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            k: self.search.k,
            top_n: self.search.top_n,
            repeat: self.search.repeat_hits,
            ranking: self.search.ranking,
        }
    }

    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            kind: self.index.kind,
            ivf: IvfParams {
                nlist: self.index.nlist,
                nprobe: self.index.nprobe,
                seed: self.index.seed,
            },
            model_name: self.encoder.model.clone(),
            parallel_threads: self.index.parallel_threads,
        }
    }
}
