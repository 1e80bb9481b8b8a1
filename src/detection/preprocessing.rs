use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::filter::{gaussian_blur_f32, median_filter};

use crate::config::PreprocessConfig;
use crate::error::DetectionError;

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Reject images the pipeline cannot score
pub fn validate_image(img: &DynamicImage) -> Result<(), DetectionError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(DetectionError::InvalidImage(format!(
            "image has zero size ({}x{})",
            img.width(),
            img.height()
        )));
    }
    Ok(())
}

/// Normalized image handed to the scorer, plus the factor that was applied
/// to both axes. Boxes found on `image` map back with `bbox.scaled(1.0 / scale)`.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub image: DynamicImage,
    pub scale: f32,
}

/// Preprocess with default filter settings and the given target size
pub fn preprocess(img: &DynamicImage, target_size: u32) -> Result<PreprocessedImage, DetectionError> {
    let config = PreprocessConfig {
        target_size,
        ..PreprocessConfig::default()
    };
    preprocess_with(img, &config)
}

/// Normalize an image before scoring:
/// 1. convert to 3 channels
/// 2. equalize local contrast on the luminance channel only
/// 3. median denoise
/// 4. resize so the larger side equals `target_size`
pub fn preprocess_with(img: &DynamicImage, config: &PreprocessConfig) -> Result<PreprocessedImage, DetectionError> {
    validate_image(img)?;

    let rgb = img.to_rgb8();
    let equalized = equalize_luminance(&rgb, config.clip_limit, config.tile_grid);

    let denoised = if config.denoise_radius > 0 {
        median_filter(&equalized, config.denoise_radius, config.denoise_radius)
    } else {
        equalized
    };

    let (resized, scale) = resize_to_target(denoised, config.target_size);

    Ok(PreprocessedImage {
        image: DynamicImage::ImageRgb8(resized),
        scale,
    })
}

/// Resize so that the larger side equals `target_size`, keeping the aspect ratio.
/// Neither side is ever shrunk below one pixel.
pub fn resize_to_target(img: RgbImage, target_size: u32) -> (RgbImage, f32) {
    let (width, height) = img.dimensions();
    let target_size = target_size.max(1);
    let scale = target_size as f32 / width.max(height) as f32;

    let new_w = ((width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, target_size);

    if (new_w, new_h) == (width, height) {
        return (img, scale);
    }

    let resized = imageops::resize(&img, new_w, new_h, FilterType::Triangle);
    (resized, scale)
}

/// Contrast-limited local equalization applied to the luma of a YCbCr
/// decomposition, so chroma (and therefore hue) is left untouched.
pub fn equalize_luminance(img: &RgbImage, clip_limit: f32, tile_grid: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut luma = GrayImage::new(width, height);
    let mut chroma = Vec::with_capacity((width * height) as usize);

    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0.map(f32::from);
        let yy = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = 128.0 + (b - yy) * 0.564;
        let cr = 128.0 + (r - yy) * 0.713;
        luma.put_pixel(x, y, Luma([yy.round().clamp(0.0, 255.0) as u8]));
        chroma.push((cb - 128.0, cr - 128.0));
    }

    let equalized = equalize_local_contrast(&luma, clip_limit, tile_grid);

    let mut output = RgbImage::new(width, height);
    for ((x, y, pixel), (cb, cr)) in output.enumerate_pixels_mut().zip(chroma) {
        let yy = equalized.get_pixel(x, y)[0] as f32;
        let r = yy + 1.403 * cr;
        let g = yy - 0.344 * cb - 0.714 * cr;
        let b = yy + 1.773 * cb;
        *pixel = Rgb([r, g, b].map(|v| v.round().clamp(0.0, 255.0) as u8));
    }
    output
}

/// Tile-based histogram equalization with a clip limit and bilinear
/// blending between neighbouring tile mappings.
pub fn equalize_local_contrast(gray: &GrayImage, clip_limit: f32, tile_grid: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tile_w = width.div_ceil(tile_grid.clamp(1, width));
    let tile_h = height.div_ceil(tile_grid.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(clipped_equalization_lut(gray, (x0, y0, x1, y1), clip_limit));
        }
    }

    // Fractional tile coordinate of a pixel centre, split into the two
    // neighbouring tile indices and the blend weight between them
    let locate = |pos: u32, tile: u32, tiles: u32| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        if f <= 0.0 {
            return (0, 0, 0.0);
        }
        let t0 = (f.floor() as u32).min(tiles - 1);
        let t1 = (t0 + 1).min(tiles - 1);
        let a = if t0 == t1 { 0.0 } else { f - t0 as f32 };
        (t0 as usize, t1 as usize, a)
    };

    let mut output = GrayImage::new(width, height);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let value = gray.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, ax) = locate(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = locate(y, tile_h, tiles_y);
        let at = |tx: usize, ty: usize| luts[ty * tiles_x as usize + tx][value] as f32;

        let top = at(tx0, ty0) * (1.0 - ax) + at(tx1, ty0) * ax;
        let bottom = at(tx0, ty1) * (1.0 - ax) + at(tx1, ty1) * ax;
        let blended = top * (1.0 - ay) + bottom * ay;
        *pixel = Luma([blended.round().clamp(0.0, 255.0) as u8]);
    }
    output
}

fn clipped_equalization_lut(gray: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let count = (x1 - x0) * (y1 - y0);
    let limit = ((clip_limit * count as f32 / 256.0) as u32).max(1);

    // Clip and spread the excess evenly over all bins
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * 255.0 / count as f32).round().min(255.0) as u8;
    }
    lut
}
