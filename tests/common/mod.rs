#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from currency_detector for tests
pub use currency_detector::{
    BoundingBox, ConfidenceBlend, CurrencyType, Detection, DetectionError, DetectionSet, DetectorConfig,
    EnsembleMerger, EnsemblePass, ExtractedItem, Extractor, ModelKind, PassId, Pipeline, RawDetection, Scorer,
    ScoringError,
};
