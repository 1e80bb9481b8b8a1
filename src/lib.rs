pub mod config;
pub mod detection;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod response;
pub mod scorer;

pub use config::{ConfidenceBlend, DetectorConfig};
pub use detection::{EnsembleMerger, EnsemblePass, Extractor};
pub use error::{DetectionError, PassFailure, ScoringError};
pub use models::{
    BoundingBox, CurrencyType, Detection, DetectionSet, ExtractedItem, ModelKind, PassId, RawDetection,
};
pub use pipeline::{DebugConfig, Pipeline, PipelineOutput};
pub use response::DetectionResponse;
pub use scorer::{ReplayScorer, Scorer};
