use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Rasterizer backend used for PDF inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RasterizerKind {
    /// In-process; renders are serialized and a hung page disables the backend.
    Pdfium,
    /// Subprocess; killed on timeout.
    #[default]
    Pdftoppm,
}

/// 出力形式: 結合PDF または ページ画像の集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Pdf,
    Images,
}

/// Encoding of per-page image files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// Encoding of images embedded in the output PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PdfImageEncoding {
    #[default]
    Jpeg,
    Flate,
}

/// 切り出し領域（基準DPIでのピクセル座標）。
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 各辺の追加トリミング比率 (0.0 <= r < 1.0)。
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CropMargins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CropSettings {
    pub region: CropRegion,
    #[serde(default = "default_reference_dpi")]
    pub reference_dpi: u32,
    #[serde(default)]
    pub margins: CropMargins,
}

fn default_reference_dpi() -> u32 {
    900
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnhanceSettings {
    pub enabled: bool,
    pub executable: PathBuf,
    pub scale: u32,
    /// 0 disables the timeout.
    pub timeout_secs: u64,
}

impl Default for EnhanceSettings {
    fn default() -> Self {
        EnhanceSettings {
            enabled: false,
            executable: PathBuf::from("realesrgan-ncnn-vulkan"),
            scale: 4,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub mode: OutputMode,
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
    pub pdf_encoding: PdfImageEncoding,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            mode: OutputMode::Pdf,
            image_format: ImageFormat::Png,
            jpeg_quality: 95,
            pdf_encoding: PdfImageEncoding::Jpeg,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dpi: u32,
    /// 0 disables the timeout.
    pub render_timeout_secs: u64,
    /// 0 means one worker per available CPU.
    pub parallel_workers: usize,
    pub chunk_size: usize,
    pub rasterizer: RasterizerKind,
    pub pdftoppm_path: PathBuf,
    pub crop: Option<CropSettings>,
    pub resize_width: Option<u32>,
    pub enhance: EnhanceSettings,
    pub output: OutputSettings,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            dpi: 600,
            render_timeout_secs: 600,
            parallel_workers: 4,
            chunk_size: 50,
            rasterizer: RasterizerKind::Pdftoppm,
            pdftoppm_path: PathBuf::from("pdftoppm"),
            crop: None,
            resize_width: None,
            enhance: EnhanceSettings::default(),
            output: OutputSettings::default(),
            scratch_dir: None,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::PageCropError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
