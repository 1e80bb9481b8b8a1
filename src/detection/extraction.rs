use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage, imageops};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_ellipse_mut};
use imageproc::morphology::close;

use crate::config::ExtractionConfig;
use crate::detection::circles::{Circle, CircleSearch};
use crate::detection::preprocessing;
use crate::models::{BoundingBox, CurrencyType, Detection, DetectionSet, ExtractedItem};

/// Semi-axis of the fallback ellipse as a fraction of each crop side
const FALLBACK_SEMI_AXIS: f32 = 0.45;

/// Shape used to build a coin's alpha mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskShape {
    Circle(Circle),
    /// Centred ellipse used when no circle is found
    Ellipse {
        center_x: i32,
        center_y: i32,
        semi_x: i32,
        semi_y: i32,
    },
}

impl MaskShape {
    /// Centred ellipse covering 90% of each axis of a `width x height` crop
    pub fn fallback_ellipse(width: u32, height: u32) -> Self {
        MaskShape::Ellipse {
            center_x: (width / 2) as i32,
            center_y: (height / 2) as i32,
            semi_x: (width as f32 * FALLBACK_SEMI_AXIS) as i32,
            semi_y: (height as f32 * FALLBACK_SEMI_AXIS) as i32,
        }
    }

    fn draw(&self, mask: &mut GrayImage) {
        let white = Luma([255u8]);
        match *self {
            MaskShape::Circle(circle) => draw_filled_circle_mut(
                mask,
                (circle.center_x.round() as i32, circle.center_y.round() as i32),
                circle.radius.round() as i32,
                white,
            ),
            MaskShape::Ellipse {
                center_x,
                center_y,
                semi_x,
                semi_y,
            } => draw_filled_ellipse_mut(mask, (center_x, center_y), semi_x, semi_y, white),
        }
    }
}

/// Turns detections into cropped item images
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractionConfig,
}

impl Extractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract every detection of a set, in set order
    pub fn extract_all(&self, image: &DynamicImage, set: &DetectionSet) -> Vec<ExtractedItem> {
        set.detections()
            .iter()
            .map(|detection| self.extract(image, detection, set.currency_type()))
            .collect()
    }

    /// Crop one detection with padding. Coins get their background removed and
    /// come back as RGBA; everything else is returned as a plain RGB crop.
    ///
    /// A box that clamps to nothing yields a 1x1 placeholder of the same
    /// channel layout instead of failing.
    pub fn extract(&self, image: &DynamicImage, detection: &Detection, currency: CurrencyType) -> ExtractedItem {
        let region = padded_crop_region(&detection.bbox, self.config.padding, image.width(), image.height());

        let extracted = match region {
            Some((x, y, width, height)) => {
                let crop = image.crop_imm(x, y, width, height).to_rgb8();
                match currency {
                    CurrencyType::Coin => DynamicImage::ImageRgba8(remove_background(&crop, &self.config)),
                    _ => DynamicImage::ImageRgb8(crop),
                }
            }
            None => {
                tracing::debug!(label = %detection.label, "Detection box is empty after clamping, using placeholder");
                placeholder(currency)
            }
        };

        ExtractedItem {
            detection: detection.clone(),
            image: extracted,
        }
    }
}

/// Expand a box by `padding` pixels on every side and clamp it to the image.
/// Returns `(x, y, width, height)`, or `None` if nothing is left.
pub fn padded_crop_region(bbox: &BoundingBox, padding: u32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let padding = padding as i64;
    let x1 = (bbox.x1.floor() as i64 - padding).max(0);
    let y1 = (bbox.y1.floor() as i64 - padding).max(0);
    let x2 = (bbox.x2.ceil() as i64 + padding).min(width as i64);
    let y2 = (bbox.y2.ceil() as i64 + padding).min(height as i64);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

fn placeholder(currency: CurrencyType) -> DynamicImage {
    match currency {
        CurrencyType::Coin => DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]))),
        _ => DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]))),
    }
}

/// Pick the mask shape for a coin crop: the strongest Hough circle, or the
/// centred fallback ellipse when none is found.
pub fn find_mask_shape(crop: &RgbImage, config: &ExtractionConfig) -> MaskShape {
    let (width, height) = crop.dimensions();
    let gray = imageops::grayscale(crop);
    let blurred = preprocessing::apply_blur(&gray, config.blur_sigma);

    match CircleSearch::for_crop(width, height, config).strongest(&blurred) {
        Some(circle) => {
            tracing::debug!(
                x = circle.center_x,
                y = circle.center_y,
                radius = circle.radius,
                votes = circle.votes,
                "Found coin outline"
            );
            MaskShape::Circle(circle)
        }
        None => {
            tracing::debug!(width, height, "No coin outline found, using centred ellipse");
            MaskShape::fallback_ellipse(width, height)
        }
    }
}

/// Smoothed alpha mask of a coin crop: the chosen shape is filled, closed to
/// remove ragged edges and blurred for anti-aliased borders.
pub fn background_mask(crop: &RgbImage, config: &ExtractionConfig) -> (GrayImage, MaskShape) {
    let (width, height) = crop.dimensions();
    let shape = find_mask_shape(crop, config);

    let mut mask = GrayImage::new(width, height);
    shape.draw(&mut mask);

    let closed = close(&mask, Norm::LInf, config.close_radius);
    let smoothed = preprocessing::apply_blur(&closed, config.blur_sigma);

    (smoothed, shape)
}

/// RGBA copy of the crop with the background made transparent
pub fn remove_background(crop: &RgbImage, config: &ExtractionConfig) -> RgbaImage {
    let (mask, _) = background_mask(crop, config);
    RgbaImage::from_fn(crop.width(), crop.height(), |x, y| {
        let [r, g, b] = crop.get_pixel(x, y).0;
        Rgba([r, g, b, mask.get_pixel(x, y)[0]])
    })
}
