use std::collections::HashMap;
use std::sync::Mutex;

use currency_detector::{BoundingBox, Detection, ModelKind, PassId, RawDetection, Scorer, ScoringError};
use image::{DynamicImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;

/// Gray background with one bright disc, like a coin photographed on a table
pub fn coin_image(width: u32, height: u32, center: (i32, i32), radius: i32) -> RgbImage {
    let mut img = ImageBuffer::from_fn(width, height, |_, _| Rgb([40u8, 40u8, 40u8]));
    draw_filled_circle_mut(&mut img, center, radius, Rgb([210u8, 180u8, 90u8]));
    img
}

/// Dark background with a green rectangle, like a banknote
pub fn banknote_image(width: u32, height: u32, note: (i32, i32, u32, u32)) -> RgbImage {
    let mut img = ImageBuffer::from_fn(width, height, |_, _| Rgb([30u8, 30u8, 30u8]));
    draw_filled_rect_mut(&mut img, Rect::at(note.0, note.1).of_size(note.2, note.3), Rgb([90u8, 160u8, 110u8]));
    img
}

/// Horizontal gradient, useful when a test just needs some pixels
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(ImageBuffer::from_fn(width, height, |x, _| {
        Luma([((x * 255) / width.max(1)) as u8])
    }))
}

pub fn raw(class_id: u32, class_name: &str, confidence: f32, bbox: [f32; 4]) -> RawDetection {
    RawDetection {
        class_id,
        class_name: class_name.to_string(),
        confidence,
        bbox: BoundingBox::from(bbox),
    }
}

pub fn det(label: &str, confidence: f32, bbox: [f32; 4], pass: PassId) -> Detection {
    Detection::new(label, confidence, BoundingBox::from(bbox), pass)
}

/// Binary model output routing to banknotes
pub fn banknote_route(confidence: f32) -> Vec<RawDetection> {
    vec![raw(0, "banknote", confidence, [0.0, 0.0, 10.0, 10.0])]
}

/// Binary model output routing to coins
pub fn coin_route(confidence: f32) -> Vec<RawDetection> {
    vec![raw(1, "coin", confidence, [0.0, 0.0, 10.0, 10.0])]
}

/// Scorer returning canned detections per model.
///
/// Boxes are given for an image of `reference_size` and rescaled to the size
/// of the image actually scored, like a real model would see them on the
/// resized preprocessed pass. Every call is logged.
pub struct MockScorer {
    reference_size: (u32, u32),
    responses: HashMap<ModelKind, Vec<RawDetection>>,
    failures: Vec<(ModelKind, Option<u32>, ScoringError)>,
    calls: Mutex<Vec<(ModelKind, u32, u32)>>,
}

impl MockScorer {
    pub fn new(reference_size: (u32, u32)) -> Self {
        Self {
            reference_size,
            responses: HashMap::new(),
            failures: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, model: ModelKind, detections: Vec<RawDetection>) -> Self {
        self.responses.insert(model, detections);
        self
    }

    /// Fail every call to `model`
    pub fn failing(mut self, model: ModelKind, error: ScoringError) -> Self {
        self.failures.push((model, None, error));
        self
    }

    /// Fail calls to `model` on images of the given width only
    pub fn failing_on_width(mut self, model: ModelKind, width: u32, error: ScoringError) -> Self {
        self.failures.push((model, Some(width), error));
        self
    }

    pub fn calls(&self, model: ModelKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|(m, _, _)| *m == model).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Sizes of the images scored with `model`, in call order
    pub fn scored_sizes(&self, model: ModelKind) -> Vec<(u32, u32)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _, _)| *m == model)
            .map(|(_, w, h)| (*w, *h))
            .collect()
    }
}

impl Scorer for MockScorer {
    fn score(&self, image: &DynamicImage, model: ModelKind) -> Result<Vec<RawDetection>, ScoringError> {
        self.calls.lock().unwrap().push((model, image.width(), image.height()));

        for (failing_model, width, error) in &self.failures {
            if *failing_model == model && width.is_none_or(|w| w == image.width()) {
                return Err(error.clone());
            }
        }

        let sx = image.width() as f32 / self.reference_size.0 as f32;
        let sy = image.height() as f32 / self.reference_size.1 as f32;
        Ok(self
            .responses
            .get(&model)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|mut d| {
                d.bbox = BoundingBox::new(d.bbox.x1 * sx, d.bbox.y1 * sy, d.bbox.x2 * sx, d.bbox.y2 * sy);
                d
            })
            .collect())
    }
}
