use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use uuid::Uuid;

use crate::config::DetectorConfig;
use crate::detection::ensemble::{EnsembleMerger, EnsemblePass};
use crate::detection::extraction::Extractor;
use crate::detection::preprocessing::{self, PreprocessedImage};
use crate::detection::router;
use crate::error::{DetectionError, PassFailure};
use crate::models::{CurrencyType, Detection, DetectionSet, ExtractedItem, ModelKind, PassId, RawDetection};
use crate::scorer::Scorer;

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Everything produced for one input image
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub request_id: Uuid,
    pub detections: DetectionSet,
    /// One item per detection, in detection order. Empty when extraction is off.
    pub items: Vec<ExtractedItem>,
    /// Passes that were excluded because their scorer call failed
    pub failed_passes: Vec<PassFailure>,
}

/// One image a scoring pass runs on, and how to map its boxes back
struct PassInput<'a> {
    pass: PassId,
    image: &'a DynamicImage,
    scale: f32,
    weight: f32,
}

/// Detection pipeline: preprocess, route, score every pass with the routed
/// model, merge the passes and extract the items.
///
/// The scorer is shared read-only, so one `Pipeline` may serve concurrent
/// requests; every request builds and drops its own images.
pub struct Pipeline {
    scorer: Arc<dyn Scorer>,
    config: DetectorConfig,
    extractor: Extractor,
    extract_images: bool,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    /// Create a pipeline around a shared scorer
    pub fn new(scorer: Arc<dyn Scorer>, config: DetectorConfig) -> Self {
        let extractor = Extractor::new(config.extraction.clone());
        Self {
            scorer,
            config,
            extractor,
            extract_images: true,
            debug: None,
        }
    }

    /// Skip item extraction when only the detections are needed
    pub fn with_extraction(mut self, extract_images: bool) -> Self {
        self.extract_images = extract_images;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });

        Ok(self)
    }

    /// Detect currency items without extracting them
    pub fn detect(&self, image: &DynamicImage) -> Result<DetectionSet, DetectionError> {
        let (detections, _) = self.detect_with_failures(image)?;
        Ok(detections)
    }

    /// Run the whole pipeline on one image
    pub fn run(&self, image: &DynamicImage) -> Result<PipelineOutput, DetectionError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("detect", %request_id);
        let _guard = span.enter();

        self.save_debug_image("00_input", "01.png", image);

        let (detections, failed_passes) = self.detect_with_failures(image)?;

        let items = if self.extract_images && !detections.is_empty() {
            let items = self.extractor.extract_all(image, &detections);
            for (idx, item) in items.iter().enumerate() {
                self.save_debug_image("02_extracted", &format!("{:02}.png", idx + 1), &item.image);
            }
            items
        } else {
            Vec::new()
        };

        tracing::info!(
            currency = %detections.currency_type(),
            count = detections.len(),
            failed_passes = failed_passes.len(),
            "Detection complete"
        );

        Ok(PipelineOutput {
            request_id,
            detections,
            items,
            failed_passes,
        })
    }

    fn detect_with_failures(&self, image: &DynamicImage) -> Result<(DetectionSet, Vec<PassFailure>), DetectionError> {
        preprocessing::validate_image(image)?;

        // Step 1: Preprocess
        let preprocessed: Option<PreprocessedImage> = if self.config.preprocessing.enabled {
            let p = preprocessing::preprocess_with(image, &self.config.preprocessing)?;
            tracing::debug!(
                width = p.image.width(),
                height = p.image.height(),
                scale = p.scale,
                "Preprocessed image"
            );
            self.save_debug_image("01_preprocessed", "01.png", &p.image);
            Some(p)
        } else {
            None
        };

        // Step 2: Choose passes; the first one is the primary pass
        let ensemble = &self.config.ensemble;
        let mut inputs = Vec::with_capacity(2);
        if let Some(p) = &preprocessed {
            inputs.push(PassInput {
                pass: PassId::Preprocessed,
                image: &p.image,
                scale: p.scale,
                weight: ensemble.preprocessed_pass_weight,
            });
        }
        if inputs.is_empty() || ensemble.use_ensemble {
            inputs.push(PassInput {
                pass: PassId::Original,
                image,
                scale: 1.0,
                weight: ensemble.original_pass_weight,
            });
        }

        // Step 3: Route on the primary pass
        let currency = router::route(self.scorer.as_ref(), inputs[0].image, self.config.thresholds.router)?;
        let Some(model) = currency.model() else {
            return Ok((DetectionSet::empty(), Vec::new()));
        };

        // Step 4: Score every pass with the specialised model
        let mut passes = Vec::with_capacity(inputs.len());
        let mut failures = Vec::new();
        for input in &inputs {
            match self.scorer.score(input.image, model) {
                Ok(raw) => {
                    let detections = to_detections(&raw, input, image.width(), image.height());
                    tracing::debug!(
                        pass = input.pass.as_str(),
                        raw = raw.len(),
                        kept = detections.len(),
                        "Scored pass"
                    );
                    passes.push(EnsemblePass::new(input.pass, input.weight, detections));
                }
                Err(error) => {
                    tracing::warn!(pass = input.pass.as_str(), model = %model, %error, "Scoring pass failed");
                    failures.push(PassFailure {
                        pass: input.pass,
                        model,
                        error,
                    });
                }
            }
        }

        if passes.is_empty() {
            return Err(all_passes_failed(model, failures));
        }

        // Step 5: Merge
        let merged = EnsembleMerger::from_config(&self.config, currency).merge(&passes);
        Ok((DetectionSet::new(currency, merged), failures))
    }

    /// Save an image in debug mode. Failures are logged, never fatal.
    fn save_debug_image(&self, step_dir_name: &str, filename: &str, image: &DynamicImage) {
        let Some(debug_config) = &self.debug else {
            return;
        };

        let step_dir = debug_config.output_dir.join(step_dir_name);
        if let Err(e) = save_image(&step_dir, filename, image) {
            tracing::warn!(error = %e, "Failed to save debug image");
        } else {
            tracing::debug!("Debug: saved {}/{}", step_dir_name, filename);
        }
    }
}

fn save_image(dir: &Path, filename: &str, image: &DynamicImage) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    image
        .save(dir.join(filename))
        .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))
}

fn all_passes_failed(model: ModelKind, mut failures: Vec<PassFailure>) -> DetectionError {
    if failures.len() == 1 {
        let failure = failures.remove(0);
        return DetectionError::ScoringFailure {
            model,
            source: failure.error,
        };
    }
    DetectionError::AllPassesFailed { failures }
}

/// Map raw detections of a pass back into the input image's pixel space.
/// Boxes are clamped to the image; boxes left without area are dropped.
fn to_detections(raw: &[RawDetection], input: &PassInput, width: u32, height: u32) -> Vec<Detection> {
    raw.iter()
        .filter_map(|r| {
            let bbox = r.bbox.scaled(1.0 / input.scale).clamp_to(width, height);
            if bbox.is_degenerate() {
                tracing::debug!(label = %r.class_name, "Dropping detection without area");
                return None;
            }
            Some(Detection::new(r.class_name.clone(), r.confidence, bbox, input.pass))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn raw(bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            class_id: 3,
            class_name: "5_coin".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::from(bbox),
        }
    }

    #[test]
    fn test_preprocessed_boxes_map_back_to_original_space() {
        let image = DynamicImage::new_rgb8(10, 10);
        let input = PassInput {
            pass: PassId::Preprocessed,
            image: &image,
            scale: 2.0,
            weight: 1.0,
        };

        let detections = to_detections(&[raw([20.0, 40.0, 100.0, 120.0])], &input, 100, 100);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(10.0, 20.0, 50.0, 60.0));
        assert_eq!(detections[0].source_pass, PassId::Preprocessed);
    }

    #[test]
    fn test_boxes_outside_image_are_clamped_or_dropped() {
        let image = DynamicImage::new_rgb8(10, 10);
        let input = PassInput {
            pass: PassId::Original,
            image: &image,
            scale: 1.0,
            weight: 1.0,
        };

        let detections = to_detections(
            &[raw([-5.0, -5.0, 60.0, 60.0]), raw([120.0, 0.0, 150.0, 20.0])],
            &input,
            50,
            50,
        );
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(0.0, 0.0, 50.0, 50.0));
    }
}
