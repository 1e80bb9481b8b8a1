use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Coarse classification decided by the binary router model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyType {
    None,
    Banknote,
    Coin,
}

impl CurrencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrencyType::None => "none",
            CurrencyType::Banknote => "banknote",
            CurrencyType::Coin => "coin",
        }
    }

    /// Map a class id of the binary model to a route.
    /// The binary model's class map is 0 = banknote, 1 = coin.
    pub fn from_binary_class(class_id: u32) -> Option<Self> {
        match class_id {
            0 => Some(CurrencyType::Banknote),
            1 => Some(CurrencyType::Coin),
            _ => None,
        }
    }

    /// The specialised model that scores this currency type
    pub fn model(&self) -> Option<ModelKind> {
        match self {
            CurrencyType::None => None,
            CurrencyType::Banknote => Some(ModelKind::Banknote),
            CurrencyType::Coin => Some(ModelKind::Coin),
        }
    }
}

impl std::fmt::Display for CurrencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical models the scorer must be able to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Binary,
    Banknote,
    Coin,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Binary => "binary",
            ModelKind::Banknote => "banknote",
            ModelKind::Coin => "coin",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which ensemble pass produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassId {
    /// Scored on the untouched input image
    Original,
    /// Scored on the contrast-equalized, denoised and resized image
    Preprocessed,
}

impl PassId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassId::Original => "original",
            PassId::Preprocessed => "preprocessed",
        }
    }
}

/// Axis-aligned box in pixel space, corners (x1, y1) and (x2, y2).
/// Serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Zero-width or zero-height (or inverted) boxes have no area
    pub fn is_degenerate(&self) -> bool {
        !(self.x2 > self.x1 && self.y2 > self.y1)
    }

    pub fn area(&self) -> f32 {
        if self.is_degenerate() {
            return 0.0;
        }
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    /// Intersection-over-Union. Identical boxes give exactly 1.0,
    /// disjoint or degenerate boxes exactly 0.0.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        if intersection == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            (intersection / union).min(1.0)
        } else {
            0.0
        }
    }

    /// Clamp the corners into `[0, width] x [0, height]`
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Multiply every coordinate by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x1: self.x1 * factor,
            y1: self.y1 * factor,
            x2: self.x2 * factor,
            y2: self.y2 * factor,
        }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

/// Raw output of one model invocation, in the pixel space of the scored image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A labelled detection in the pixel space of the input image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub source_pass: PassId,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox, source_pass: PassId) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            source_pass,
        }
    }
}

/// Final detections of one request together with the routed currency type.
/// The type is `None` exactly when there are no detections.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSet {
    currency_type: CurrencyType,
    detections: Vec<Detection>,
}

impl DetectionSet {
    /// A `None` route never carries detections, and an empty list is always `None`.
    pub fn new(currency_type: CurrencyType, detections: Vec<Detection>) -> Self {
        if detections.is_empty() || currency_type == CurrencyType::None {
            return Self::empty();
        }
        Self {
            currency_type,
            detections,
        }
    }

    pub fn empty() -> Self {
        Self {
            currency_type: CurrencyType::None,
            detections: Vec::new(),
        }
    }

    pub fn currency_type(&self) -> CurrencyType {
        self.currency_type
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// One cropped currency item. Coins carry an alpha channel.
#[derive(Debug, Clone)]
pub struct ExtractedItem {
    pub detection: Detection,
    pub image: DynamicImage,
}
