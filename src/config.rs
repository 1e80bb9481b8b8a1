use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

use crate::models::CurrencyType;

/// How confidences of a merged cluster are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBlend {
    /// Highest per-pass confidence of the cluster
    #[default]
    Max,
    /// Highest confidence boosted towards 1.0 by the weighted confidence of
    /// the other passes that agree with it
    Corroborated,
}

/// Complete configuration of the detection core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub ensemble: EnsembleConfig,
    pub thresholds: ThresholdConfig,
    pub preprocessing: PreprocessConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Same-label detections overlapping above this IoU are collapsed
    pub merge_iou_threshold: f32,
    /// Run both the original and the preprocessed pass
    pub use_ensemble: bool,
    pub blend: ConfidenceBlend,
    pub original_pass_weight: f32,
    pub preprocessed_pass_weight: f32,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            merge_iou_threshold: 0.5,
            use_ensemble: true,
            blend: ConfidenceBlend::Max,
            original_pass_weight: 1.0,
            preprocessed_pass_weight: 1.0,
        }
    }
}

/// Confidence floors. Each model is calibrated differently, so banknote and
/// coin detections have separate defaults; `classes` overrides per label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub router: f32,
    pub banknote: f32,
    pub coin: f32,
    pub classes: HashMap<String, f32>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            router: 0.25,
            banknote: 0.5,
            coin: 0.4,
            classes: HashMap::new(),
        }
    }
}

impl ThresholdConfig {
    /// Floor applied to labels without an explicit override
    pub fn default_floor(&self, currency: CurrencyType) -> f32 {
        match currency {
            CurrencyType::Banknote => self.banknote,
            CurrencyType::Coin => self.coin,
            CurrencyType::None => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub enabled: bool,
    /// Length of the larger side after resizing
    pub target_size: u32,
    /// Histogram clip limit of the local contrast equalization
    pub clip_limit: f32,
    /// Number of tiles per axis for local contrast equalization
    pub tile_grid: u32,
    /// Radius of the median denoising filter (0 disables it)
    pub denoise_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_size: 640,
            clip_limit: 2.0,
            tile_grid: 8,
            denoise_radius: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Pixels added on every side of a box before cropping
    pub padding: u32,
    /// Circle search radius range as fractions of the crop's smaller side
    pub circle_radius_fraction: (f32, f32),
    /// Minimum distance between two circle centres
    pub circle_min_distance: f32,
    /// Upper Canny threshold; the lower one is half of it
    pub canny_high: f32,
    /// Minimum centre votes for a circle candidate
    pub accumulator_threshold: u32,
    /// Sigma of the Gaussian used on the crop and on the mask edges
    pub blur_sigma: f32,
    /// Radius of the square structuring element used to close the mask
    pub close_radius: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            padding: 10,
            circle_radius_fraction: (0.3, 0.6),
            circle_min_distance: 50.0,
            canny_high: 50.0,
            accumulator_threshold: 30,
            blur_sigma: 1.1,
            close_radius: 2,
        }
    }
}

impl DetectorConfig {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: DetectorConfig = toml::from_str(contents).context("Failed to parse detector config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        let unit = |v: f32| (0.0..=1.0).contains(&v);

        ensure!(
            unit(self.ensemble.merge_iou_threshold),
            "merge_iou_threshold must be within [0, 1], got {}",
            self.ensemble.merge_iou_threshold
        );
        ensure!(
            self.ensemble.original_pass_weight > 0.0 && self.ensemble.preprocessed_pass_weight > 0.0,
            "pass weights must be positive"
        );

        for (name, value) in [
            ("router", self.thresholds.router),
            ("banknote", self.thresholds.banknote),
            ("coin", self.thresholds.coin),
        ] {
            ensure!(unit(value), "{} threshold must be within [0, 1], got {}", name, value);
        }
        for (label, value) in &self.thresholds.classes {
            ensure!(unit(*value), "threshold for class '{}' must be within [0, 1], got {}", label, value);
        }

        ensure!(self.preprocessing.target_size > 0, "target_size must be positive");
        ensure!(self.preprocessing.tile_grid > 0, "tile_grid must be positive");
        ensure!(self.preprocessing.clip_limit > 0.0, "clip_limit must be positive");

        let (min, max) = self.extraction.circle_radius_fraction;
        ensure!(
            min > 0.0 && min < max,
            "circle_radius_fraction must satisfy 0 < min < max, got ({}, {})",
            min,
            max
        );
        ensure!(self.extraction.blur_sigma > 0.0, "blur_sigma must be positive");
        ensure!(self.extraction.canny_high > 0.0, "canny_high must be positive");

        Ok(())
    }
}
