use thiserror::Error;

use crate::models::{ModelKind, PassId};

/// Failure reported by a scorer implementation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringError {
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("scoring timed out after {0} ms")]
    Timeout(u64),

    #[error("malformed model output: {0}")]
    Malformed(String),
}

/// Errors surfaced by the detection core
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("scoring with the {model} model failed: {source}")]
    ScoringFailure {
        model: ModelKind,
        #[source]
        source: ScoringError,
    },

    #[error("all {} scoring passes failed", .failures.len())]
    AllPassesFailed { failures: Vec<PassFailure> },

    #[error("scoring timed out after {elapsed_ms} ms")]
    ScoringTimeout { elapsed_ms: u64 },

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

impl DetectionError {
    /// True for any failure that originates in the external scorer
    pub fn is_scoring_failure(&self) -> bool {
        matches!(
            self,
            DetectionError::ScoringFailure { .. }
                | DetectionError::AllPassesFailed { .. }
                | DetectionError::ScoringTimeout { .. }
        )
    }
}

/// A pass that was excluded from the ensemble because its scorer call failed
#[derive(Debug, Clone, PartialEq)]
pub struct PassFailure {
    pub pass: PassId,
    pub model: ModelKind,
    pub error: ScoringError,
}

impl std::fmt::Display for PassFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} pass ({} model): {}", self.pass.as_str(), self.model, self.error)
    }
}
