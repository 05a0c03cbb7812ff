// 幾何変換テスト: 切り出し矩形の導出、クランプ則、リサイズ、決定性

use image::{DynamicImage, GrayImage, RgbImage};
use pdf_pagecrop::config::settings::{CropMargins, CropRegion, CropSettings};
use pdf_pagecrop::transform::{CropSpec, crop, resize_to_width};
use sha2::{Digest, Sha256};

fn scan_region() -> CropRegion {
    CropRegion {
        x: 1695,
        y: 900,
        width: 2931,
        height: 4453,
    }
}

fn scan_margins() -> CropMargins {
    CropMargins {
        left: 0.07,
        right: 0.07,
        top: 0.06,
        bottom: 0.07,
    }
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * 7 + y * 3) % 256) as u8])
    }))
}

fn checksum(image: &DynamicImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================
// 1. CropSpec::derive
// ============================================================

#[test]
fn test_derive_at_reference_dpi() {
    let spec = CropSpec::derive(scan_region(), 900, 900, scan_margins());
    assert_eq!(
        spec,
        CropSpec {
            x_start: 1900,
            y_start: 1167,
            width: 2521,
            height: 3875,
        }
    );
}

#[test]
fn test_derive_scales_region_before_margins() {
    let spec = CropSpec::derive(scan_region(), 900, 1800, scan_margins());
    assert_eq!(spec.x_start, 3390 + 410);
    assert_eq!(spec.width, 5862 - 820);
}

#[test]
fn test_derive_without_margins_is_scaled_region() {
    let spec = CropSpec::derive(scan_region(), 900, 450, CropMargins::default());
    assert_eq!(
        spec,
        CropSpec {
            x_start: 847,
            y_start: 450,
            width: 1465,
            height: 2226,
        }
    );
}

#[test]
fn test_derive_at_odd_dpi_lands_on_exact_quotient() {
    let region = CropRegion {
        x: 180,
        y: 0,
        width: 0,
        height: 0,
    };
    // 180 * 65 / 900 == 13 exactly
    let spec = CropSpec::derive(region, 900, 65, CropMargins::default());
    assert_eq!(spec.x_start, 13);
}

#[test]
fn test_derive_exact_multiples_at_every_dpi() {
    let region = CropRegion {
        x: 900,
        y: 180,
        width: 4500,
        height: 2700,
    };
    for dpi in 1..=1200u32 {
        let spec = CropSpec::derive(region, 900, dpi, CropMargins::default());
        assert_eq!(spec.x_start, dpi, "x at {dpi} dpi");
        assert_eq!(spec.width, dpi * 5, "width at {dpi} dpi");
        assert_eq!(spec.height, dpi * 3, "height at {dpi} dpi");
        if dpi % 5 == 0 {
            assert_eq!(spec.y_start, dpi / 5, "y at {dpi} dpi");
        }
    }
}

#[test]
fn test_derive_saturates_extreme_region() {
    let region = CropRegion {
        x: u32::MAX,
        y: u32::MAX - 1,
        width: u32::MAX,
        height: 1000,
    };
    let margins = CropMargins {
        left: 0.5,
        right: 0.0,
        top: 0.5,
        bottom: 0.0,
    };
    let spec = CropSpec::derive(region, 900, 1800, margins);
    assert_eq!(spec.x_start, u32::MAX);
    assert_eq!(spec.y_start, u32::MAX);
    assert!(spec.width <= u32::MAX / 2 + 1);

    let image = gradient(10, 10);
    let cropped = crop(image, &spec);
    assert_eq!((cropped.width(), cropped.height()), (0, 0));
}

#[test]
fn test_from_settings_matches_derive() {
    let settings = CropSettings {
        region: scan_region(),
        reference_dpi: 900,
        margins: scan_margins(),
    };
    assert_eq!(
        CropSpec::from_settings(&settings, 900),
        CropSpec::derive(scan_region(), 900, 900, scan_margins())
    );
}

// ============================================================
// 2. crop: クランプ則
// ============================================================

#[test]
fn test_crop_inside_bounds_is_exact() {
    let spec = CropSpec {
        x_start: 10,
        y_start: 5,
        width: 40,
        height: 30,
    };
    let out = crop(gradient(100, 80), &spec);
    assert_eq!((out.width(), out.height()), (40, 30));
}

#[test]
fn test_crop_clamping_law_never_panics() {
    let image_sizes = [(1, 1), (10, 10), (64, 48), (100, 7)];
    let specs = [
        (0, 0, 0, 0),
        (0, 0, 10, 10),
        (5, 5, 100, 100),
        (9, 9, 1, 1),
        (200, 0, 10, 10),
        (0, 200, 10, 10),
        (3, 2, u32::MAX, u32::MAX),
    ];
    for (w, h) in image_sizes {
        for (x, y, sw, sh) in specs {
            let spec = CropSpec {
                x_start: x,
                y_start: y,
                width: sw,
                height: sh,
            };
            let out = crop(gradient(w, h), &spec);
            assert!(
                out.width() <= sw.min(w.saturating_sub(x)),
                "width {} for spec {spec:?} on {w}x{h}",
                out.width()
            );
            assert!(
                out.height() <= sh.min(h.saturating_sub(y)),
                "height {} for spec {spec:?} on {w}x{h}",
                out.height()
            );
        }
    }
}

#[test]
fn test_crop_keeps_pixel_content() {
    let spec = CropSpec {
        x_start: 3,
        y_start: 4,
        width: 5,
        height: 5,
    };
    let source = gradient(20, 20);
    let out = crop(source.clone(), &spec).to_rgb8();
    assert_eq!(out.get_pixel(0, 0), source.to_rgb8().get_pixel(3, 4));
}

#[test]
fn test_crop_preserves_grayscale() {
    let image = DynamicImage::ImageLuma8(GrayImage::new(30, 30));
    let spec = CropSpec {
        x_start: 0,
        y_start: 0,
        width: 10,
        height: 10,
    };
    assert!(matches!(crop(image, &spec), DynamicImage::ImageLuma8(_)));
}

#[test]
fn test_crop_is_idempotent_up_to_size() {
    let spec = CropSpec {
        x_start: 4,
        y_start: 4,
        width: 30,
        height: 20,
    };
    let once = crop(gradient(50, 40), &spec);
    let twice = crop(once.clone(), &spec);
    assert!(twice.width() <= once.width());
    assert!(twice.height() <= once.height());

    // stable across runs
    let again = crop(crop(gradient(50, 40), &spec), &spec);
    assert_eq!(checksum(&twice), checksum(&again));
}

// ============================================================
// 3. resize_to_width
// ============================================================

#[test]
fn test_resize_keeps_aspect_ratio() {
    let out = resize_to_width(gradient(200, 300), 100);
    assert_eq!((out.width(), out.height()), (100, 150));
}

#[test]
fn test_resize_rounds_height() {
    // 3 * 5 / 2 = 7.5 -> 8
    let out = resize_to_width(gradient(2, 5), 3);
    assert_eq!((out.width(), out.height()), (3, 8));
}

#[test]
fn test_resize_same_width_is_noop() {
    let image = gradient(64, 32);
    let before = checksum(&image);
    let out = resize_to_width(image, 64);
    assert_eq!(checksum(&out), before);
}

#[test]
fn test_resize_is_deterministic() {
    let a = resize_to_width(gradient(123, 77), 50);
    let b = resize_to_width(gradient(123, 77), 50);
    assert_eq!(checksum(&a), checksum(&b));
}

#[test]
fn test_resize_zero_sized_image_unchanged() {
    let out = resize_to_width(DynamicImage::ImageRgb8(RgbImage::new(0, 0)), 100);
    assert_eq!((out.width(), out.height()), (0, 0));
}
