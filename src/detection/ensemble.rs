use std::collections::HashMap;

use crate::config::{ConfidenceBlend, DetectorConfig};
use crate::models::{BoundingBox, CurrencyType, Detection, PassId};

/// Detections produced by one scoring pass, with the weight of that pass
#[derive(Debug, Clone)]
pub struct EnsemblePass {
    pub pass: PassId,
    pub weight: f32,
    pub detections: Vec<Detection>,
}

impl EnsemblePass {
    pub fn new(pass: PassId, weight: f32, detections: Vec<Detection>) -> Self {
        Self {
            pass,
            weight,
            detections,
        }
    }
}

/// Intersection-over-Union of two boxes
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    a.iou(b)
}

/// A detection in the candidate pool, tagged with the weight of its pass
#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    detection: &'a Detection,
    weight: f32,
}

/// Merges overlapping detections from several passes into one detection per object.
///
/// Candidates are clustered greedily in descending confidence order: a
/// candidate joins the first cluster whose representative has the same label
/// and an IoU above the threshold, otherwise it opens a new cluster. Each
/// cluster yields one detection carrying the label and box of its most
/// confident member, and a blended confidence that is never lower than that
/// member's. Results under the per-class floor are dropped.
#[derive(Debug, Clone)]
pub struct EnsembleMerger {
    pub iou_threshold: f32,
    pub blend: ConfidenceBlend,
    class_floors: HashMap<String, f32>,
    default_floor: f32,
}

impl EnsembleMerger {
    pub fn new(iou_threshold: f32, blend: ConfidenceBlend) -> Self {
        Self {
            iou_threshold,
            blend,
            class_floors: HashMap::new(),
            default_floor: 0.0,
        }
    }

    pub fn with_class_floors(mut self, class_floors: HashMap<String, f32>, default_floor: f32) -> Self {
        self.class_floors = class_floors;
        self.default_floor = default_floor;
        self
    }

    /// Merger for the detections of the model that scores `currency`
    pub fn from_config(config: &DetectorConfig, currency: CurrencyType) -> Self {
        Self::new(config.ensemble.merge_iou_threshold, config.ensemble.blend).with_class_floors(
            config.thresholds.classes.clone(),
            config.thresholds.default_floor(currency),
        )
    }

    pub fn floor_for(&self, label: &str) -> f32 {
        self.class_floors.get(label).copied().unwrap_or(self.default_floor)
    }

    pub fn merge(&self, passes: &[EnsemblePass]) -> Vec<Detection> {
        let total_weight: f32 = passes.iter().map(|p| p.weight).sum();

        let mut candidates: Vec<Candidate> = passes
            .iter()
            .flat_map(|pass| {
                pass.detections.iter().map(move |detection| Candidate {
                    detection,
                    weight: pass.weight,
                })
            })
            .collect();

        // Stable, so equal confidences keep pass order
        candidates.sort_by(|a, b| b.detection.confidence.total_cmp(&a.detection.confidence));

        let mut clusters: Vec<Vec<Candidate>> = Vec::new();
        for candidate in candidates {
            let home = clusters.iter_mut().find(|cluster| {
                let representative = cluster[0].detection;
                representative.label == candidate.detection.label
                    && representative.bbox.iou(&candidate.detection.bbox) > self.iou_threshold
            });
            match home {
                Some(cluster) => cluster.push(candidate),
                None => clusters.push(vec![candidate]),
            }
        }

        let mut merged: Vec<Detection> = clusters
            .iter()
            .map(|cluster| self.synthesize(cluster, total_weight))
            .filter(|detection| {
                let keep = detection.confidence >= self.floor_for(&detection.label);
                if !keep {
                    tracing::debug!(
                        label = %detection.label,
                        confidence = detection.confidence,
                        "Dropping detection below class floor"
                    );
                }
                keep
            })
            .collect();

        // Most confident first, tighter box first on ties
        merged.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.bbox.area().total_cmp(&b.bbox.area()))
        });

        merged
    }

    fn synthesize(&self, cluster: &[Candidate], total_weight: f32) -> Detection {
        let best = cluster[0];

        let confidence = match self.blend {
            ConfidenceBlend::Max => best.detection.confidence,
            ConfidenceBlend::Corroborated => {
                // Best confidence of every other source pass that saw this object
                let mut seen = vec![best.detection.source_pass];
                let mut support = 0.0;
                for member in &cluster[1..] {
                    if seen.contains(&member.detection.source_pass) {
                        continue;
                    }
                    seen.push(member.detection.source_pass);
                    support += member.weight * member.detection.confidence;
                }
                let support = if total_weight > 0.0 {
                    (support / total_weight).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                best.detection.confidence + (1.0 - best.detection.confidence) * support
            }
        };

        if cluster.len() > 1 {
            tracing::debug!(
                label = %best.detection.label,
                members = cluster.len(),
                confidence,
                "Merged overlapping detections"
            );
        }

        Detection {
            label: best.detection.label.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox: best.detection.bbox,
            source_pass: best.detection.source_pass,
        }
    }
}
