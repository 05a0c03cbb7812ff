// 画像フォルダ入力: page_<n>.<ext> をページとして扱う

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use image::DynamicImage;
use regex::Regex;

use super::Rasterizer;
use crate::error::{PageCropError, PageFailure};

static PAGE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page_(\d+)").expect("page number pattern must compile"));

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// ファイル名からページ番号を取り出す（`page_(\d+)` の最初の一致）。
pub fn page_number_from_name(name: &str) -> Option<u32> {
    PAGE_NUMBER
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Lists `page_<n>` images in `dir`, keyed by page number.
///
/// Files without a page number or with a non-image extension are ignored.
/// When two files carry the same number the lexicographically first wins.
pub fn list_page_images(dir: &Path) -> crate::error::Result<BTreeMap<u32, PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    entries.sort();

    let mut pages = BTreeMap::new();
    for path in entries {
        let Some(page) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(page_number_from_name)
        else {
            continue;
        };
        pages.entry(page).or_insert(path);
    }
    Ok(pages)
}

/// A directory of already-rasterized page images. `dpi` is ignored.
pub struct ImageDirSource {
    pages: BTreeMap<u32, PathBuf>,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> crate::error::Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(PageCropError::config(format!(
                "image source '{}' is not a directory",
                dir.display()
            )));
        }
        Ok(Self {
            pages: list_page_images(dir)?,
        })
    }
}

impl Rasterizer for ImageDirSource {
    fn page_count(&self) -> crate::error::Result<u32> {
        Ok(self.pages.keys().next_back().copied().unwrap_or(0))
    }

    /// Decodes the file on the calling worker. `dpi` and `timeout` do not
    /// apply: decoding a local file is bounded by its size.
    fn render_page(
        &self,
        page_index: u32,
        _dpi: u32,
        _timeout: Option<Duration>,
    ) -> Result<DynamicImage, PageFailure> {
        let Some(path) = self.pages.get(&page_index) else {
            return Err(PageFailure::render(
                page_index,
                "no image file for this page",
            ));
        };
        image::open(path)
            .map_err(|e| PageFailure::render(page_index, format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_extraction() {
        assert_eq!(page_number_from_name("page_12.png"), Some(12));
        assert_eq!(page_number_from_name("scan_page_7_x4.jpg"), Some(7));
        assert_eq!(page_number_from_name("cover.png"), None);
        assert_eq!(page_number_from_name("page_.png"), None);
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(has_image_extension(Path::new("page_1.PNG")));
        assert!(has_image_extension(Path::new("page_1.jpeg")));
        assert!(!has_image_extension(Path::new("page_1.pdf")));
    }
}
