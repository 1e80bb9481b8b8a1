use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::models::{BoundingBox, ModelKind, RawDetection};

/// Interface to the pretrained detection models.
///
/// Implementations own the loaded models and are shared read-only between
/// concurrent requests, so they must be `Send + Sync`. Boxes are returned in
/// the pixel space of the image that was scored.
pub trait Scorer: Send + Sync {
    fn score(&self, image: &DynamicImage, model: ModelKind) -> Result<Vec<RawDetection>, ScoringError>;
}

/// On-disk recording of model outputs for one photograph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
    /// Width and height of the image the boxes were recorded against
    pub image_size: (u32, u32),
    #[serde(default, flatten)]
    pub models: HashMap<ModelKind, Vec<RawDetection>>,
}

/// Scorer that replays detections recorded by an external model runner.
///
/// Boxes are rescaled from the recorded image size to the size of the image
/// being scored, so one recording serves both the original and the resized
/// preprocessed pass.
#[derive(Debug, Clone)]
pub struct ReplayScorer {
    recording: Recording,
}

impl ReplayScorer {
    pub fn new(recording: Recording) -> Self {
        Self { recording }
    }

    pub fn from_json_str(contents: &str) -> anyhow::Result<Self> {
        let recording: Recording = serde_json::from_str(contents).context("Failed to parse detection recording")?;
        anyhow::ensure!(
            recording.image_size.0 > 0 && recording.image_size.1 > 0,
            "Recorded image size must be non-zero"
        );
        Ok(Self::new(recording))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read detection recording {}", path.display()))?;
        Self::from_json_str(&contents)
    }
}

impl Scorer for ReplayScorer {
    fn score(&self, image: &DynamicImage, model: ModelKind) -> Result<Vec<RawDetection>, ScoringError> {
        let detections = self
            .recording
            .models
            .get(&model)
            .ok_or_else(|| ScoringError::Unavailable(format!("no recorded output for the {} model", model)))?;

        let (ref_w, ref_h) = self.recording.image_size;
        if ref_w == 0 || ref_h == 0 {
            return Err(ScoringError::Malformed("recorded image size is zero".to_string()));
        }
        let sx = image.width() as f32 / ref_w as f32;
        let sy = image.height() as f32 / ref_h as f32;

        Ok(detections
            .iter()
            .map(|det| RawDetection {
                bbox: BoundingBox::new(det.bbox.x1 * sx, det.bbox.y1 * sy, det.bbox.x2 * sx, det.bbox.y2 * sy),
                ..det.clone()
            })
            .collect())
    }
}
