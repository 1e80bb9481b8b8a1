use image::DynamicImage;

use crate::error::{DetectionError, ScoringError};
use crate::models::{CurrencyType, ModelKind, RawDetection};
use crate::scorer::Scorer;

/// Decide which specialised model handles the image, using one call of
/// the binary coin-vs-banknote model.
///
/// Binary detections under `confidence_floor` are ignored. No remaining
/// detection means `CurrencyType::None`; otherwise the class id of the most
/// confident one decides. Scorer errors are surfaced, never guessed around.
pub fn route(scorer: &dyn Scorer, image: &DynamicImage, confidence_floor: f32) -> Result<CurrencyType, DetectionError> {
    let detections = scorer
        .score(image, ModelKind::Binary)
        .map_err(|source| DetectionError::ScoringFailure {
            model: ModelKind::Binary,
            source,
        })?;

    let Some(top) = most_confident(&detections, confidence_floor) else {
        tracing::debug!(raw = detections.len(), "Router found no currency");
        return Ok(CurrencyType::None);
    };

    let currency = CurrencyType::from_binary_class(top.class_id).ok_or_else(|| DetectionError::ScoringFailure {
        model: ModelKind::Binary,
        source: ScoringError::Malformed(format!(
            "unknown binary class id {} ({})",
            top.class_id, top.class_name
        )),
    })?;

    tracing::debug!(
        currency = %currency,
        confidence = top.confidence,
        class_name = %top.class_name,
        "Routed image"
    );

    Ok(currency)
}

/// Highest-confidence detection at or above the floor; the earliest wins ties
fn most_confident(detections: &[RawDetection], confidence_floor: f32) -> Option<&RawDetection> {
    detections
        .iter()
        .filter(|d| d.confidence >= confidence_floor)
        .fold(None, |best: Option<&RawDetection>, d| match best {
            Some(b) if b.confidence >= d.confidence => Some(b),
            _ => Some(d),
        })
}
