//! Encoders turning query text and key-frame images into vectors.
//!
//! The ranking core only sees the [`Encoder`] trait. [`ClipEncoder`] is the
//! production implementation: CLIP ViT-B/32 run locally through fastembed,
//! with the text and image towers sharing one 512-dimensional space so
//! a text query can be compared against frame vectors.

use crate::vector::{VECTOR_DIMENSION_512, VectorDimension, VectorError};
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for producing vectors from text and images.
///
/// Implementations must be thread-safe; the search pipeline calls
/// `encode_text` once per query.
pub trait Encoder: Send + Sync {
    /// Encodes one text into a vector.
    fn encode_text(&self, text: &str) -> Result<Vec<f32>, VectorError>;

    /// Encodes several texts, one vector per input.
    fn encode_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        texts.iter().map(|text| self.encode_text(text)).collect()
    }

    /// Encodes image files, one vector per path.
    fn encode_images(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Dimension of every vector this encoder produces.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Name recorded in the index manifest.
    #[must_use]
    fn model_name(&self) -> &str;
}

/// CLIP variants with paired text and image towers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipModel {
    VitB32,
}

impl ClipModel {
    fn text_model(self) -> EmbeddingModel {
        match self {
            ClipModel::VitB32 => EmbeddingModel::ClipVitB32,
        }
    }

    fn image_model(self) -> ImageEmbeddingModel {
        match self {
            ClipModel::VitB32 => ImageEmbeddingModel::ClipVitB32,
        }
    }

    fn dimension(self) -> VectorDimension {
        match self {
            ClipModel::VitB32 => VectorDimension::dimension_512(),
        }
    }
}

/// Converts a model to the name used in settings and manifests.
#[must_use]
pub fn model_to_string(model: ClipModel) -> &'static str {
    match model {
        ClipModel::VitB32 => "ClipVitB32",
    }
}

/// Parses a model name from settings.
pub fn parse_clip_model(name: &str) -> Result<ClipModel, VectorError> {
    match name {
        "ClipVitB32" | "clip-vit-b-32" | "clip-ViT-B-32" => Ok(ClipModel::VitB32),
        other => Err(VectorError::EncodingFailed(format!(
            "Unknown encoder model '{other}'. Supported models: ClipVitB32"
        ))),
    }
}

/// Local CLIP encoder backed by fastembed.
///
/// The text tower loads eagerly. The image tower loads on first use,
/// so search-only processes never pay for it.
pub struct ClipEncoder {
    model: ClipModel,
    text: Mutex<TextEmbedding>,
    image: Mutex<Option<ImageEmbedding>>,
    cache_dir: PathBuf,
    show_download_progress: bool,
}

impl std::fmt::Debug for ClipEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipEncoder")
            .field("model", &self.model)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl ClipEncoder {
    /// Loads the text tower of `model`, downloading it into `cache_dir` on
    /// first use.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(
        model: ClipModel,
        cache_dir: impl AsRef<Path>,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        let text = TextEmbedding::try_new(
            InitOptions::new(model.text_model())
                .with_cache_dir(cache_dir.clone())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EncodingFailed(
            format!("Failed to initialize text encoder: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        tracing::debug!(
            "Loaded {} text encoder from {}",
            model_to_string(model),
            cache_dir.display()
        );

        Ok(Self {
            model,
            text: Mutex::new(text),
            image: Mutex::new(None),
            cache_dir,
            show_download_progress,
        })
    }

    fn load_image_model(&self) -> Result<ImageEmbedding, VectorError> {
        ImageEmbedding::try_new(
            ImageInitOptions::new(self.model.image_model())
                .with_cache_dir(self.cache_dir.clone())
                .with_show_download_progress(self.show_download_progress),
        )
        .map_err(|e| VectorError::EncodingFailed(format!("Failed to initialize image encoder: {e}")))
    }
}

impl Encoder for ClipEncoder {
    fn encode_text(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.encode_texts(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| VectorError::EncodingFailed("Encoder returned no vector".to_string()))
    }

    fn encode_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .text
            .lock()
            .map_err(|_| {
                VectorError::EncodingFailed(
                    "Failed to acquire text encoder lock - model may be poisoned".to_string(),
                )
            })?
            .embed(texts.to_vec(), None)
            .map_err(|e| VectorError::EncodingFailed(format!("Failed to encode text: {e}")))?;

        validate_dimensions(&embeddings, self.dimension())?;
        Ok(embeddings)
    }

    fn encode_images(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, VectorError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.image.lock().map_err(|_| {
            VectorError::EncodingFailed(
                "Failed to acquire image encoder lock - model may be poisoned".to_string(),
            )
        })?;
        if guard.is_none() {
            *guard = Some(self.load_image_model()?);
        }
        let Some(model) = guard.as_mut() else {
            return Err(VectorError::EncodingFailed(
                "Image encoder is not initialized".to_string(),
            ));
        };

        let embeddings = model
            .embed(paths.to_vec(), None)
            .map_err(|e| VectorError::EncodingFailed(format!("Failed to encode images: {e}")))?;

        validate_dimensions(&embeddings, self.dimension())?;
        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.model.dimension()
    }

    fn model_name(&self) -> &str {
        model_to_string(self.model)
    }
}

fn validate_dimensions(
    embeddings: &[Vec<f32>],
    dimension: VectorDimension,
) -> Result<(), VectorError> {
    for embedding in embeddings {
        dimension.validate_vector(embedding)?;
    }
    Ok(())
}

/// Mock encoder for testing.
///
/// Produces deterministic vectors from the text bytes so equal inputs map
/// to equal vectors and different inputs usually do not.
#[cfg(test)]
pub struct MockEncoder {
    dimension: VectorDimension,
}

#[cfg(test)]
impl MockEncoder {
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut vector = vec![0.0; dim];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % dim] += f32::from(byte) / 255.0;
        }
        vector
    }
}

#[cfg(test)]
impl Encoder for MockEncoder {
    fn encode_text(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        Ok(self.vector_for(text))
    }

    fn encode_images(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(paths
            .iter()
            .map(|path| self.vector_for(&path.to_string_lossy()))
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
