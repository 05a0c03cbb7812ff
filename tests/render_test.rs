// Render integration tests
//
// Test PDFs are generated with lopdf to avoid fixture files. pdfium tests run
// only when PDFIUM_DYNAMIC_LIB_PATH points at the shared library.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{DynamicImage, RgbImage};
use pdf_pagecrop::error::PageFailure;
use pdf_pagecrop::render::Rasterizer;
use pdf_pagecrop::render::image_dir::{ImageDirSource, list_page_images};
use pdf_pagecrop::render::pdftoppm::PdftoppmRasterizer;

/// Create a minimal 2-page PDF (Letter size: 612x792 points) using lopdf.
fn create_test_pdf(dir: &Path) -> PathBuf {
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for _ in 0..2 {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {},
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(2),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join("test.pdf");
    doc.save(&path).expect("failed to save test PDF");
    path
}

// ============================================================
// 1. pdfium
// ============================================================

#[cfg(feature = "pdfium")]
mod pdfium {
    use super::*;
    use pdf_pagecrop::render::pdfium::{PdfiumRasterizer, render_page};

    fn pdfium_available() -> bool {
        std::env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some()
    }

    #[test]
    fn test_render_page_dimensions() {
        if !pdfium_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let pdf = create_test_pdf(dir.path());

        let image = render_page(&pdf, 1, 72).expect("render at 72 dpi");
        assert_eq!((image.width(), image.height()), (612, 792));

        let image = render_page(&pdf, 2, 144).expect("render at 144 dpi");
        assert_eq!((image.width(), image.height()), (1224, 1584));
    }

    #[test]
    fn test_render_page_rejects_page_zero_and_past_end() {
        if !pdfium_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let pdf = create_test_pdf(dir.path());
        assert!(render_page(&pdf, 0, 72).is_err());
        assert!(render_page(&pdf, 3, 72).is_err());
    }

    #[test]
    fn test_render_page_zero_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = create_test_pdf(dir.path());
        assert!(render_page(&pdf, 1, 0).is_err());
    }

    #[test]
    fn test_rasterizer_page_count_and_render() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = create_test_pdf(dir.path());
        let rasterizer = PdfiumRasterizer::new(&pdf);
        assert_eq!(rasterizer.page_count().unwrap(), 2);

        if !pdfium_available() {
            return;
        }
        let image = rasterizer
            .render_page(1, 36, Some(Duration::from_secs(60)))
            .expect("render");
        assert_eq!((image.width(), image.height()), (306, 396));
    }
}

// ============================================================
// 2. pdftoppm
// ============================================================

#[test]
fn test_pdftoppm_page_count_from_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = create_test_pdf(dir.path());
    let rasterizer = PdftoppmRasterizer::new(&pdf, "pdftoppm");
    assert_eq!(rasterizer.page_count().unwrap(), 2);
}

#[test]
fn test_pdftoppm_missing_binary_is_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = create_test_pdf(dir.path());
    let scratch = dir.path().join("scratch");
    let rasterizer =
        PdftoppmRasterizer::new(&pdf, "/nonexistent/pdftoppm").with_scratch_root(&scratch);

    let err = rasterizer
        .render_page(1, 72, Some(Duration::from_secs(5)))
        .expect_err("binary does not exist");
    assert!(matches!(err, PageFailure::RenderError { page: 1, .. }));
    assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
}

// ============================================================
// 3. 画像ディレクトリ
// ============================================================

fn save(dir: &Path, name: &str, width: u32) {
    DynamicImage::ImageRgb8(RgbImage::new(width, 5))
        .save(dir.join(name))
        .unwrap();
}

#[test]
fn test_list_page_images_sorts_numerically() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), "page_10.png", 10);
    save(dir.path(), "page_2.png", 2);
    save(dir.path(), "page_1.jpg", 1);
    std::fs::write(dir.path().join("page_3.txt"), "not an image").unwrap();
    std::fs::write(dir.path().join("readme.md"), "").unwrap();

    let pages = list_page_images(dir.path()).unwrap();
    assert_eq!(pages.keys().copied().collect::<Vec<u32>>(), vec![1, 2, 10]);
}

#[test]
fn test_image_dir_source_renders_and_reports_gaps() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), "page_1.png", 7);
    save(dir.path(), "page_3.png", 9);

    let source = ImageDirSource::open(dir.path()).unwrap();
    assert_eq!(source.page_count().unwrap(), 3);

    let image = source.render_page(3, 600, None).expect("page 3 exists");
    assert_eq!(image.width(), 9);

    let err = source.render_page(2, 600, None).expect_err("page 2 is missing");
    assert!(matches!(err, PageFailure::RenderError { page: 2, .. }));
}

#[test]
fn test_image_dir_source_corrupt_file_is_render_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("page_1.png"), b"not a png").unwrap();
    let source = ImageDirSource::open(dir.path()).unwrap();
    assert!(source.render_page(1, 72, Some(Duration::from_secs(5))).is_err());
}

#[test]
fn test_image_dir_source_requires_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("page_1.png");
    save(dir.path(), "page_1.png", 1);
    assert!(ImageDirSource::open(&file).is_err());
}
