//! Integration tests for item extraction.
//!
//! Tests cover:
//! - Crop sizes and channel layout for banknotes and coins
//! - Background removal of coins with and without a visible outline
//! - Placeholders for boxes outside the image
//! - Determinism

mod common;

use currency_detector::config::ExtractionConfig;
use currency_detector::detection::MaskShape;
use currency_detector::detection::extraction::{background_mask, padded_crop_region, remove_background};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use common::*;

fn coin_set(detections: Vec<Detection>) -> DetectionSet {
    DetectionSet::new(CurrencyType::Coin, detections)
}

#[test]
fn test_banknote_crop_is_padded_rgb() {
    let image = DynamicImage::ImageRgb8(banknote_image(400, 300, (100, 80, 160, 90)));
    let detection = det("20_note", 0.9, [100.0, 80.0, 260.0, 170.0], PassId::Original);

    let item = Extractor::default().extract(&image, &detection, CurrencyType::Banknote);

    assert!(matches!(item.image, DynamicImage::ImageRgb8(_)));
    assert_eq!(item.image.dimensions(), (180, 110));
    assert_eq!(item.detection, detection);
}

#[test]
fn test_crop_is_clamped_at_image_border() {
    let image = DynamicImage::ImageRgb8(banknote_image(200, 100, (0, 0, 60, 40)));
    let detection = det("5_note", 0.8, [0.0, 0.0, 60.5, 40.2], PassId::Original);

    let item = Extractor::default().extract(&image, &detection, CurrencyType::Banknote);

    // Left and top padding fall outside the image; right and bottom round up
    assert_eq!(item.image.dimensions(), (71, 51));
}

#[test]
fn test_crop_never_exceeds_box_plus_padding() {
    let padding = 10;
    let boxes = [
        [0.0, 0.0, 640.0, 480.0],
        [-30.0, -30.0, 50.0, 50.0],
        [12.3, 45.6, 78.9, 101.1],
        [600.0, 400.0, 700.0, 520.0],
    ];

    for b in boxes {
        let bbox = BoundingBox::from(b);
        let (x, y, w, h) = padded_crop_region(&bbox, padding, 640, 480).expect("region inside image");
        assert!(x + w <= 640 && y + h <= 480, "{:?} escapes the image", b);
        assert!(w as f32 <= bbox.width() + 2.0 * padding as f32 + 2.0);
        assert!(h as f32 <= bbox.height() + 2.0 * padding as f32 + 2.0);
        assert!(w >= 1 && h >= 1);
    }
}

#[test]
fn test_box_outside_image_gives_placeholder() {
    let image = DynamicImage::ImageRgb8(banknote_image(100, 100, (10, 10, 50, 50)));
    let outside = det("1_coin", 0.9, [300.0, 300.0, 350.0, 350.0], PassId::Original);
    let extractor = Extractor::default();

    let coin = extractor.extract(&image, &outside, CurrencyType::Coin);
    assert_eq!(coin.image.dimensions(), (1, 1));
    assert!(matches!(coin.image, DynamicImage::ImageRgba8(_)));
    assert_eq!(coin.image.to_rgba8().get_pixel(0, 0)[3], 0);

    let note = extractor.extract(&image, &outside, CurrencyType::Banknote);
    assert_eq!(note.image.dimensions(), (1, 1));
    assert!(matches!(note.image, DynamicImage::ImageRgb8(_)));
}

#[test]
fn test_coin_outline_becomes_alpha_mask() {
    let crop = coin_image(140, 140, (70, 70), 60);
    let config = ExtractionConfig::default();

    let (mask, shape) = background_mask(&crop, &config);

    let MaskShape::Circle(circle) = shape else {
        panic!("expected a circle, got {:?}", shape);
    };
    assert!((circle.center_x - 70.0).abs() <= 3.0, "centre x {}", circle.center_x);
    assert!((circle.center_y - 70.0).abs() <= 3.0, "centre y {}", circle.center_y);
    assert!((circle.radius - 60.0).abs() <= 3.0, "radius {}", circle.radius);

    let covered: f32 = mask.pixels().map(|p| p[0] as f32 / 255.0).sum();
    let disc = std::f32::consts::PI * 60.0 * 60.0;
    assert!((covered - disc).abs() <= disc * 0.1, "mask covers {} px, disc is {} px", covered, disc);
    assert!((circle.area() - disc).abs() <= disc * 0.1);

    assert!(mask.get_pixel(70, 70)[0] >= 250);
    assert_eq!(mask.get_pixel(0, 0)[0], 0);
}

#[test]
fn test_coin_item_is_rgba_with_transparent_corners() {
    let image = DynamicImage::ImageRgb8(coin_image(300, 240, (150, 120), 50));
    let detection = det("2_coin", 0.85, [100.0, 70.0, 200.0, 170.0], PassId::Preprocessed);

    let items = Extractor::default().extract_all(&image, &coin_set(vec![detection]));
    assert_eq!(items.len(), 1);

    let item = &items[0];
    assert!(matches!(item.image, DynamicImage::ImageRgba8(_)));
    assert_eq!(item.image.dimensions(), (120, 120));

    let rgba = item.image.to_rgba8();
    assert_eq!(rgba.get_pixel(0, 0)[3], 0);
    assert_eq!(rgba.get_pixel(119, 119)[3], 0);
    let centre = rgba.get_pixel(60, 60);
    assert!(centre[3] >= 250);
    assert_eq!(&centre.0[..3], &[210, 180, 90]);
}

#[test]
fn test_featureless_crop_falls_back_to_ellipse() {
    let crop = RgbImage::from_pixel(80, 60, Rgb([120, 120, 120]));
    let config = ExtractionConfig::default();

    let (mask, shape) = background_mask(&crop, &config);
    assert_eq!(shape, MaskShape::fallback_ellipse(80, 60));

    let rgba = remove_background(&crop, &config);
    assert_eq!(rgba.dimensions(), (80, 60));
    for (x, y) in [(0, 0), (79, 0), (0, 59), (79, 59)] {
        assert_eq!(rgba.get_pixel(x, y)[3], 0, "corner ({}, {}) is not transparent", x, y);
    }
    assert!(rgba.get_pixel(40, 30)[3] >= 250);
    assert!(mask.get_pixel(40, 30)[0] >= 250);
}

#[test]
fn test_extraction_is_deterministic_and_order_independent() {
    let mut img = coin_image(320, 160, (80, 80), 45);
    imageproc::drawing::draw_filled_circle_mut(&mut img, (240, 80), 40, Rgb([190, 190, 200]));
    let image = DynamicImage::ImageRgb8(img);

    let a = det("1_coin", 0.9, [35.0, 35.0, 125.0, 125.0], PassId::Original);
    let b = det("2_coin", 0.8, [200.0, 40.0, 280.0, 120.0], PassId::Original);
    let extractor = Extractor::default();

    let forward = extractor.extract_all(&image, &coin_set(vec![a.clone(), b.clone()]));
    let alone_a = extractor.extract(&image, &a, CurrencyType::Coin);
    let alone_b = extractor.extract(&image, &b, CurrencyType::Coin);

    assert_eq!(forward.len(), 2);
    assert_eq!(forward[0].image.as_bytes(), alone_a.image.as_bytes());
    assert_eq!(forward[1].image.as_bytes(), alone_b.image.as_bytes());
    assert_eq!(forward[0].detection.label, "1_coin");
    assert_eq!(forward[1].detection.label, "2_coin");
}
