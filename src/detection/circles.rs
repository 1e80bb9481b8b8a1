use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use crate::config::ExtractionConfig;
use crate::detection::preprocessing;

/// A circle found by the Hough search, in crop pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    /// Accumulator votes of the centre
    pub votes: u32,
}

impl Circle {
    pub fn area(&self) -> f32 {
        std::f32::consts::PI * self.radius * self.radius
    }
}

/// Gradient Hough circle search.
///
/// Every Canny edge pixel votes for centres along its gradient direction at
/// all radii in `[min_radius, max_radius]`. Local maxima of the accumulator
/// become centre candidates, and each candidate's radius is the most
/// supported edge distance.
#[derive(Debug, Clone)]
pub struct CircleSearch {
    pub min_radius: u32,
    pub max_radius: u32,
    pub min_distance: f32,
    pub canny_high: f32,
    pub accumulator_threshold: u32,
}

impl CircleSearch {
    /// Search parameters for a crop, with the radius range expressed as
    /// fractions of the crop's smaller side
    pub fn for_crop(width: u32, height: u32, config: &ExtractionConfig) -> Self {
        let side = width.min(height) as f32;
        let (min_fraction, max_fraction) = config.circle_radius_fraction;
        Self {
            min_radius: (side * min_fraction) as u32,
            max_radius: (side * max_fraction) as u32,
            min_distance: config.circle_min_distance,
            canny_high: config.canny_high,
            accumulator_threshold: config.accumulator_threshold,
        }
    }

    /// Strongest circle in an already blurred intensity image
    pub fn strongest(&self, blurred: &GrayImage) -> Option<Circle> {
        self.detect(blurred).into_iter().next()
    }

    /// All circles, strongest first
    pub fn detect(&self, blurred: &GrayImage) -> Vec<Circle> {
        let (width, height) = blurred.dimensions();
        let min_radius = self.min_radius.max(1);
        if width < 3 || height < 3 || self.max_radius < min_radius {
            return Vec::new();
        }

        let edges = preprocessing::detect_edges(blurred, self.canny_high / 2.0, self.canny_high);
        let gx = horizontal_sobel(blurred);
        let gy = vertical_sobel(blurred);

        let mut accumulator = vec![0u32; (width * height) as usize];
        let mut edge_points = Vec::new();

        for (x, y, pixel) in edges.enumerate_pixels() {
            if pixel[0] == 0 {
                continue;
            }
            let dx = gx.get_pixel(x, y)[0] as f32;
            let dy = gy.get_pixel(x, y)[0] as f32;
            let magnitude = dx.hypot(dy);
            if magnitude == 0.0 {
                continue;
            }
            edge_points.push((x as f32, y as f32));

            // Centre lies on the gradient line, on either side of the edge
            let (ux, uy) = (dx / magnitude, dy / magnitude);
            for r in min_radius..=self.max_radius {
                for sign in [-1.0f32, 1.0] {
                    let cx = (x as f32 + sign * ux * r as f32).round();
                    let cy = (y as f32 + sign * uy * r as f32).round();
                    if cx < 0.0 || cy < 0.0 || cx >= width as f32 || cy >= height as f32 {
                        continue;
                    }
                    accumulator[cy as usize * width as usize + cx as usize] += 1;
                }
            }
        }

        let mut candidates = local_maxima(&accumulator, width, height, self.accumulator_threshold);
        candidates.sort_by(|a, b| b.2.cmp(&a.2));

        let mut circles: Vec<Circle> = Vec::new();
        for (cx, cy, votes) in candidates {
            let (cx, cy) = (cx as f32, cy as f32);
            let too_close = circles
                .iter()
                .any(|c| (c.center_x - cx).hypot(c.center_y - cy) < self.min_distance);
            if too_close {
                continue;
            }

            let Some((radius, support)) = estimate_radius(&edge_points, (cx, cy), min_radius, self.max_radius) else {
                continue;
            };
            if support < self.accumulator_threshold {
                continue;
            }

            circles.push(Circle {
                center_x: cx,
                center_y: cy,
                radius,
                votes,
            });
        }

        circles
    }
}

/// Accumulator cells above `threshold` that are not beaten by any of their
/// eight neighbours. Plateaus keep only their first cell in raster order.
fn local_maxima(accumulator: &[u32], width: u32, height: u32, threshold: u32) -> Vec<(u32, u32, u32)> {
    let (w, h) = (width as i64, height as i64);
    let at = |x: i64, y: i64| -> u32 {
        if x < 0 || y < 0 || x >= w || y >= h {
            0
        } else {
            accumulator[(y * w + x) as usize]
        }
    };

    let mut maxima = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let votes = at(x, y);
            if votes < threshold.max(1) {
                continue;
            }
            let is_peak = [(-1, -1), (0, -1), (1, -1), (-1, 0)]
                .iter()
                .all(|&(dx, dy)| votes > at(x + dx, y + dy))
                && [(1, 0), (-1, 1), (0, 1), (1, 1)]
                    .iter()
                    .all(|&(dx, dy)| votes >= at(x + dx, y + dy));
            if is_peak {
                maxima.push((x as u32, y as u32, votes));
            }
        }
    }
    maxima
}

/// Most supported radius around `center`: edge distances are binned per
/// pixel, and the best three-bin window gives the radius as its weighted mean.
fn estimate_radius(edge_points: &[(f32, f32)], center: (f32, f32), min_radius: u32, max_radius: u32) -> Option<(f32, u32)> {
    let bins = (max_radius - min_radius + 1) as usize;
    let mut histogram = vec![0u32; bins];

    for &(x, y) in edge_points {
        let distance = (x - center.0).hypot(y - center.1).round();
        if distance < min_radius as f32 || distance > max_radius as f32 {
            continue;
        }
        histogram[distance as usize - min_radius as usize] += 1;
    }

    let window = |i: usize| -> u32 { histogram[i.saturating_sub(1)..(i + 2).min(bins)].iter().sum() };
    let best = (0..bins).max_by_key(|&i| (window(i), std::cmp::Reverse(i)))?;
    let support = window(best);
    if support == 0 {
        return None;
    }

    let range = best.saturating_sub(1)..(best + 2).min(bins);
    let weighted: f32 = range
        .clone()
        .map(|i| (i as f32 + min_radius as f32) * histogram[i] as f32)
        .sum();
    let radius = weighted / support as f32;

    Some((radius, support))
}
