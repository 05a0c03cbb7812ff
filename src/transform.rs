// 幾何変換: 切り出し矩形の計算、クランプ付きクロップ、幅指定リサイズ
//
// All functions here are pure and total: they take ownership of the page
// image and return the next one, never failing on out-of-range input.

use image::DynamicImage;
use image::imageops::FilterType;

use crate::config::settings::{CropMargins, CropRegion, CropSettings};

/// Crop rectangle in pixels of the rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSpec {
    pub x_start: u32,
    pub y_start: u32,
    pub width: u32,
    pub height: u32,
}

impl CropSpec {
    /// 基準DPIで定義された領域を描画DPIに換算し、マージン比率を差し引く。
    ///
    /// Each coordinate is scaled as `v * dpi / reference_dpi` in integer
    /// arithmetic, and each margin amount is truncated toward zero. Results
    /// saturate at `u32::MAX`; a zero `reference_dpi` is treated as 1.
    pub fn derive(region: CropRegion, reference_dpi: u32, dpi: u32, margins: CropMargins) -> Self {
        let reference_dpi = u64::from(reference_dpi.max(1));
        let scaled = |v: u32| {
            u32::try_from(u64::from(v) * u64::from(dpi) / reference_dpi).unwrap_or(u32::MAX)
        };

        let rx = scaled(region.x);
        let ry = scaled(region.y);
        let rw = scaled(region.width);
        let rh = scaled(region.height);

        let part = |len: u32, ratio: f64| (len as f64 * ratio).floor() as u32;

        CropSpec {
            x_start: rx.saturating_add(part(rw, margins.left)),
            y_start: ry.saturating_add(part(rh, margins.top)),
            width: rw.saturating_sub(part(rw, margins.left + margins.right)),
            height: rh.saturating_sub(part(rh, margins.top + margins.bottom)),
        }
    }

    pub fn from_settings(settings: &CropSettings, dpi: u32) -> Self {
        Self::derive(
            settings.region,
            settings.reference_dpi,
            dpi,
            settings.margins,
        )
    }

    /// 画像サイズにクランプした実効矩形 `(x, y, width, height)` を返す。
    ///
    /// `crop_end = min(start + size, dimension)`; a start past the edge gives
    /// a zero-sized rectangle.
    pub fn clamped_to(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let x = self.x_start.min(image_width);
        let y = self.y_start.min(image_height);
        let x_end = self.x_start.saturating_add(self.width).min(image_width);
        let y_end = self.y_start.saturating_add(self.height).min(image_height);
        (x, y, x_end.saturating_sub(x), y_end.saturating_sub(y))
    }
}

/// Crop `image` to `spec`, clamped to the image bounds.
pub fn crop(image: DynamicImage, spec: &CropSpec) -> DynamicImage {
    let (x, y, width, height) = spec.clamped_to(image.width(), image.height());
    if (x, y, width, height) == (0, 0, image.width(), image.height()) {
        return image;
    }
    image.crop_imm(x, y, width, height)
}

/// Resize to `target_width`, keeping the aspect ratio.
///
/// `target_height = round(target_width * height / width)`, Lanczos3 filter.
/// Zero-sized images and a zero target are returned unchanged.
pub fn resize_to_width(image: DynamicImage, target_width: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 || target_width == 0 || target_width == width {
        return image;
    }
    let target_height =
        ((target_width as f64 * height as f64 / width as f64).round() as u32).max(1);
    image.resize_exact(target_width, target_height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_rect_inside_image_is_unchanged() {
        let spec = CropSpec {
            x_start: 10,
            y_start: 20,
            width: 30,
            height: 40,
        };
        assert_eq!(spec.clamped_to(100, 100), (10, 20, 30, 40));
    }

    #[test]
    fn clamped_rect_truncates_overflow() {
        let spec = CropSpec {
            x_start: 90,
            y_start: 95,
            width: 30,
            height: 40,
        };
        assert_eq!(spec.clamped_to(100, 100), (90, 95, 10, 5));
    }

    #[test]
    fn clamped_rect_start_past_edge_is_empty() {
        let spec = CropSpec {
            x_start: 150,
            y_start: 0,
            width: 30,
            height: 40,
        };
        let (_, _, w, h) = spec.clamped_to(100, 100);
        assert_eq!(w, 0);
        assert_eq!(h, 40);
    }
}
