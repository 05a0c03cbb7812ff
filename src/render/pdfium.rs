// pdfium-render wrapper: page -> DynamicImage (in-memory only)

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use image::DynamicImage;
use pdfium_render::prelude::*;

use super::{Rasterizer, RenderGate};
use crate::error::PageFailure;

/// pdfium keeps one library-wide lock for the lifetime of a `Pdfium`
/// instance, so renders are serialized process-wide and a hung page disables
/// the backend for every later job.
static PDFIUM_GATE: LazyLock<RenderGate> = LazyLock::new(RenderGate::new);

/// Resolves the path to the pdfium shared library.
///
/// Search order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` environment variable
/// 2. `vendor/pdfium/lib/` relative to the project root (for development)
fn resolve_pdfium_lib_path() -> crate::error::Result<PathBuf> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Ok(p);
        }
        return Err(crate::error::PageCropError::render(format!(
            "PDFIUM_DYNAMIC_LIB_PATH is set to '{}' but the path does not exist",
            path
        )));
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let vendor_path = PathBuf::from(&manifest_dir).join("vendor/pdfium/lib");
        if vendor_path.exists() {
            return Ok(vendor_path);
        }
    }

    Err(crate::error::PageCropError::render(
        "pdfium library not found: set PDFIUM_DYNAMIC_LIB_PATH or place libpdfium.so in vendor/pdfium/lib/",
    ))
}

/// Creates a new Pdfium instance by dynamically loading the shared library.
fn create_pdfium() -> crate::error::Result<Pdfium> {
    let lib_path = resolve_pdfium_lib_path()?;
    let lib_path_str = lib_path.to_str().ok_or_else(|| {
        crate::error::PageCropError::render("pdfium library path contains non-UTF-8 characters")
    })?;
    let bindings =
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(lib_path_str))?;
    Ok(Pdfium::new(bindings))
}

/// Renders one PDF page at the given DPI.
///
/// The document is opened per call so that no pdfium state outlives the
/// page; only one page bitmap is alive at a time.
///
/// # Arguments
/// * `pdf_path` - Path to the PDF file
/// * `page_index` - 1-indexed page number
/// * `dpi` - Resolution in dots per inch (72 DPI = 1 point per pixel)
///
/// # Errors
/// Returns `PageCropError::RenderError` if the library cannot be bound, the
/// PDF cannot be opened, the page is out of range, or rendering fails.
pub fn render_page(
    pdf_path: &Path,
    page_index: u32,
    dpi: u32,
) -> crate::error::Result<DynamicImage> {
    if dpi == 0 {
        return Err(crate::error::PageCropError::render("dpi must be positive"));
    }
    let pdfium = create_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, None)?;

    let zero_based = page_index
        .checked_sub(1)
        .and_then(|i| u16::try_from(i).ok())
        .ok_or_else(|| {
            crate::error::PageCropError::render(format!("page index {page_index} out of range"))
        })?;

    let page = document.pages().get(zero_based)?;

    // PDF default user unit: 1 point = 1/72 inch
    let width_px = (page.width().value * dpi as f32 / 72.0).round() as i32;
    let height_px = (page.height().value * dpi as f32 / 72.0).round() as i32;

    let config = PdfRenderConfig::new()
        .set_target_width(width_px)
        .set_target_height(height_px);

    let bitmap = page.render_with_config(&config)?;

    Ok(bitmap.as_image())
}

/// In-process pdfium backend.
///
/// A render that exceeds its timeout cannot be stopped. It is left running,
/// and later pages fail with a render error at once. Use the pdftoppm backend
/// when pages may hang.
pub struct PdfiumRasterizer {
    pdf_path: PathBuf,
}

impl PdfiumRasterizer {
    pub fn new(pdf_path: impl Into<PathBuf>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
        }
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn page_count(&self) -> crate::error::Result<u32> {
        Ok(crate::pdf::reader::PdfReader::open(&self.pdf_path)?.page_count())
    }

    fn render_page(
        &self,
        page_index: u32,
        dpi: u32,
        timeout: Option<Duration>,
    ) -> Result<DynamicImage, PageFailure> {
        let path = self.pdf_path.clone();
        PDFIUM_GATE.run(page_index, timeout, move || {
            render_page(&path, page_index, dpi)
        })
    }
}
