//! Turning a manifest of videos into tagged vectors for the store.
//!
//! A manifest lists videos with their URL and any of: key-frame image
//! paths, a description, a subtitle text, an audio transcript, or vectors
//! computed elsewhere. Every produced vector carries its kind explicitly.

use crate::error::{IndexError, IndexResult};
use crate::store::EntityVectors;
use crate::vector::{EntityId, Encoder, VectorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level ingest manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestManifest {
    pub videos: Vec<VideoEntry>,
}

/// One video to ingest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoEntry {
    pub url: String,

    /// Overrides the id derived from the URL
    #[serde(default)]
    pub id: Option<String>,

    /// Key-frame image paths, relative to the manifest file
    #[serde(default)]
    pub frames: Vec<PathBuf>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub subtitles: Option<String>,

    #[serde(default)]
    pub audio_transcript: Option<String>,

    #[serde(default)]
    pub vectors: PrecomputedVectors,
}

/// Vectors supplied directly; they win over encoding for the same kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecomputedVectors {
    #[serde(default)]
    pub video: Vec<Vec<f32>>,
    #[serde(default)]
    pub description: Option<Vec<f32>>,
    #[serde(default)]
    pub subtitle: Option<Vec<f32>>,
    #[serde(default)]
    pub audio: Option<Vec<f32>>,
}

impl IngestManifest {
    /// Reads a manifest file.
    pub fn load(path: &Path) -> IndexResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| IndexError::Ingest {
            entry: path.display().to_string(),
            reason: format!("cannot read manifest: {e}"),
        })?;
        Self::from_json(&json).map_err(|e| match e {
            IndexError::Ingest { reason, .. } => IndexError::Ingest {
                entry: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(json: &str) -> IndexResult<Self> {
        serde_json::from_str(json).map_err(|e| IndexError::Ingest {
            entry: "<manifest>".to_string(),
            reason: format!("invalid manifest JSON: {e}"),
        })
    }
}

impl VideoEntry {
    /// Explicit id, or the one derived from the URL.
    pub fn entity_id(&self) -> IndexResult<EntityId> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.trim().is_empty()) {
            return Ok(EntityId::new(id.trim()));
        }
        EntityId::from_url(&self.url).ok_or_else(|| IndexError::Ingest {
            entry: self.url.clone(),
            reason: "cannot derive an id from the URL; set \"id\" explicitly".to_string(),
        })
    }
}

/// Counts of what one ingest produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub videos: usize,
    pub frames_encoded: usize,
    pub texts_encoded: usize,
    pub precomputed: usize,
}

/// Produces the vectors of every manifest entry.
///
/// `base_dir` resolves relative frame paths. Fails on the first entry that
/// cannot be turned into vectors; nothing is returned for earlier entries
/// in that case, so callers never upsert half a manifest.
pub fn encode_manifest(
    manifest: &IngestManifest,
    encoder: &dyn Encoder,
    base_dir: &Path,
) -> IndexResult<(Vec<EntityVectors>, IngestStats)> {
    let mut stats = IngestStats::default();
    let mut entities = Vec::with_capacity(manifest.videos.len());

    for entry in &manifest.videos {
        let entity = encode_entry(entry, encoder, base_dir, &mut stats)?;
        tracing::debug!(
            "Prepared {} vectors for {}",
            entity.vectors.len(),
            entity.id
        );
        entities.push(entity);
        stats.videos += 1;
    }

    Ok((entities, stats))
}

fn encode_entry(
    entry: &VideoEntry,
    encoder: &dyn Encoder,
    base_dir: &Path,
    stats: &mut IngestStats,
) -> IndexResult<EntityVectors> {
    let id = entry.entity_id()?;
    let failed = |reason: String| IndexError::Ingest {
        entry: id.to_string(),
        reason,
    };
    let mut entity = EntityVectors::new(id.clone(), entry.url.clone());

    if entry.vectors.video.is_empty() {
        let paths: Vec<PathBuf> = entry
            .frames
            .iter()
            .map(|frame| {
                if frame.is_absolute() {
                    frame.clone()
                } else {
                    base_dir.join(frame)
                }
            })
            .collect();
        let frames = encoder
            .encode_images(&paths)
            .map_err(|e| failed(format!("frame encoding failed: {e}")))?;
        if frames.len() != paths.len() {
            return Err(failed(format!(
                "encoder returned {} vectors for {} frames",
                frames.len(),
                paths.len()
            )));
        }
        stats.frames_encoded += frames.len();
        for vector in frames {
            entity.vectors.push((VectorKind::Video, vector));
        }
    } else {
        stats.precomputed += entry.vectors.video.len();
        for vector in &entry.vectors.video {
            entity.vectors.push((VectorKind::Video, vector.clone()));
        }
    }

    let texts = [
        (
            VectorKind::Description,
            &entry.vectors.description,
            &entry.description,
        ),
        (
            VectorKind::Subtitle,
            &entry.vectors.subtitle,
            &entry.subtitles,
        ),
        (
            VectorKind::Audio,
            &entry.vectors.audio,
            &entry.audio_transcript,
        ),
    ];

    let mut pending: Vec<(VectorKind, &str)> = Vec::new();
    for (kind, precomputed, text) in texts {
        if let Some(vector) = precomputed {
            entity.vectors.push((kind, vector.clone()));
            stats.precomputed += 1;
        } else if let Some(text) = text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            pending.push((kind, text));
        }
    }

    if !pending.is_empty() {
        let inputs: Vec<&str> = pending.iter().map(|(_, text)| *text).collect();
        let vectors = encoder
            .encode_texts(&inputs)
            .map_err(|e| failed(format!("text encoding failed: {e}")))?;
        if vectors.len() != inputs.len() {
            return Err(failed(format!(
                "encoder returned {} vectors for {} texts",
                vectors.len(),
                inputs.len()
            )));
        }
        stats.texts_encoded += vectors.len();
        for ((kind, _), vector) in pending.into_iter().zip(vectors) {
            entity.vectors.push((kind, vector));
        }
    }

    Ok(entity)
}
