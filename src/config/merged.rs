use std::path::PathBuf;
use std::time::Duration;

use super::job::Job;
use super::settings::{
    CropSettings, EnhanceSettings, ImageFormat, OutputMode, PdfImageEncoding, RasterizerKind,
    Settings,
};
use crate::error::PageCropError;

/// Settings and one job merged into the immutable configuration of a run.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub dpi: u32,
    pub render_timeout: Option<Duration>,
    pub parallel_workers: usize,
    pub chunk_size: usize,
    pub rasterizer: RasterizerKind,
    pub pdftoppm_path: PathBuf,
    pub crop: Option<CropSettings>,
    pub resize_width: Option<u32>,
    pub enhance: EnhanceSettings,
    pub output_mode: OutputMode,
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
    pub pdf_encoding: PdfImageEncoding,
    pub scratch_dir: Option<PathBuf>,
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        let mut enhance = settings.enhance.clone();
        if let Some(enabled) = job.enhance {
            enhance.enabled = enabled;
        }

        let parallel_workers = if settings.parallel_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            settings.parallel_workers
        };

        MergedConfig {
            dpi: job.dpi.unwrap_or(settings.dpi),
            render_timeout: secs_to_timeout(settings.render_timeout_secs),
            parallel_workers,
            chunk_size: job.chunk_size.unwrap_or(settings.chunk_size),
            rasterizer: settings.rasterizer,
            pdftoppm_path: settings.pdftoppm_path.clone(),
            crop: settings.crop.clone(),
            resize_width: job.resize_width.or(settings.resize_width),
            enhance,
            output_mode: job.output_mode.unwrap_or(settings.output.mode),
            image_format: settings.output.image_format,
            jpeg_quality: settings.output.jpeg_quality,
            pdf_encoding: settings.output.pdf_encoding,
            scratch_dir: settings.scratch_dir.clone(),
        }
    }

    pub fn enhance_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.enhance.timeout_secs)
    }

    /// 値域を検証する。パイプライン開始前に呼ぶこと。
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.dpi == 0 {
            return Err(PageCropError::config("dpi must be positive"));
        }
        if self.parallel_workers == 0 {
            return Err(PageCropError::config("parallel_workers must be positive"));
        }
        if self.chunk_size == 0 {
            return Err(PageCropError::config("chunk_size must be positive"));
        }
        if self.resize_width == Some(0) {
            return Err(PageCropError::config("resize_width must be positive"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PageCropError::config(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.enhance.enabled && self.enhance.scale == 0 {
            return Err(PageCropError::config("enhance.scale must be positive"));
        }
        if let Some(crop) = &self.crop {
            if crop.reference_dpi == 0 {
                return Err(PageCropError::config("crop.reference_dpi must be positive"));
            }
            let m = &crop.margins;
            for (name, ratio) in [
                ("left", m.left),
                ("right", m.right),
                ("top", m.top),
                ("bottom", m.bottom),
            ] {
                if !(0.0..1.0).contains(&ratio) {
                    return Err(PageCropError::config(format!(
                        "crop margin '{name}' must be in [0, 1), got {ratio}"
                    )));
                }
            }
            if m.left + m.right >= 1.0 || m.top + m.bottom >= 1.0 {
                return Err(PageCropError::config(
                    "opposite crop margins must sum to less than 1",
                ));
            }
        }
        Ok(())
    }
}
