// ページ単位処理: 描画 → アルファ除去 → クロップ → 高画質化 → リサイズ → 出力
//
// Every step takes the image by value and hands the next one on, so at most
// one decoded copy of the page is alive at a time. Failures never leave this
// module as errors; they become a Failed PageResult.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, warn};

use super::{PageArtifact, PageDescriptor, PageResult};
use crate::config::merged::MergedConfig;
use crate::config::settings::ImageFormat;
use crate::enhance::Enhancer;
use crate::error::PageFailure;
use crate::transform::{self, CropSpec};

/// Geometric steps applied to every page.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub crop: Option<CropSpec>,
    pub resize_width: Option<u32>,
    pub render_timeout: Option<Duration>,
}

impl WorkerConfig {
    pub fn from_merged(config: &MergedConfig) -> Self {
        WorkerConfig {
            crop: config
                .crop
                .as_ref()
                .map(|crop| CropSpec::from_settings(crop, config.dpi)),
            resize_width: config.resize_width,
            render_timeout: config.render_timeout,
        }
    }
}

/// Where finished pages go.
#[derive(Debug, Clone)]
pub enum ArtifactSink {
    /// Keep the decoded image; the consumer owns it.
    InMemory,
    /// Encode to `dir/page_<index>.<ext>`.
    Directory {
        dir: PathBuf,
        format: ImageFormat,
        jpeg_quality: u8,
    },
}

impl ArtifactSink {
    fn store(&self, page_index: u32, image: DynamicImage) -> Result<PageArtifact, PageFailure> {
        let ArtifactSink::Directory {
            dir,
            format,
            jpeg_quality,
        } = self
        else {
            return Ok(PageArtifact::Image(image));
        };

        let path = dir.join(format!("page_{page_index}.{}", format.extension()));
        let written = match format {
            ImageFormat::Png => image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| e.to_string()),
            ImageFormat::Jpeg => File::create(&path)
                .map_err(|e| e.to_string())
                .and_then(|file| {
                    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), *jpeg_quality);
                    image.write_with_encoder(encoder).map_err(|e| e.to_string())
                }),
        };
        drop(image);

        match written {
            Ok(()) => Ok(PageArtifact::File(path)),
            Err(e) => {
                // a half-written page must not look like output
                let _ = std::fs::remove_file(&path);
                Err(PageFailure::codec(
                    page_index,
                    format!("write {}: {e}", path.display()),
                ))
            }
        }
    }
}

/// アルファチャンネルを落とし、8bitのRGBまたはグレースケールに揃える。
fn flatten(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Turns one [`PageDescriptor`] into one [`PageResult`].
#[derive(Debug, Clone)]
pub struct PageWorker {
    config: WorkerConfig,
    enhancer: Option<Enhancer>,
    sink: ArtifactSink,
}

impl PageWorker {
    pub fn new(config: WorkerConfig, sink: ArtifactSink) -> Self {
        Self {
            config,
            enhancer: None,
            sink,
        }
    }

    pub fn with_enhancer(mut self, enhancer: Option<Enhancer>) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn render_and_transform(&self, descriptor: &PageDescriptor) -> PageResult {
        let page = descriptor.page_index;
        match self.process(descriptor) {
            Ok(artifact) => {
                debug!(page, "page done");
                PageResult::ok(page, artifact)
            }
            Err(failure) => {
                warn!(page, %failure, "page failed");
                PageResult::failed(failure)
            }
        }
    }

    fn process(&self, descriptor: &PageDescriptor) -> Result<PageArtifact, PageFailure> {
        let page = descriptor.page_index;

        let image = descriptor
            .source
            .render_page(page, descriptor.dpi, self.config.render_timeout)?;
        let image = flatten(image);

        let image = match &self.config.crop {
            Some(spec) => {
                let cropped = transform::crop(image, spec);
                if cropped.width() == 0 || cropped.height() == 0 {
                    return Err(PageFailure::codec(
                        page,
                        format!("crop {spec:?} leaves no pixels"),
                    ));
                }
                cropped
            }
            None => image,
        };

        let image = match &self.enhancer {
            Some(enhancer) => flatten(enhancer.enhance(page, image)?),
            None => image,
        };

        let image = match self.config.resize_width {
            Some(width) => transform::resize_to_width(image, width),
            None => image,
        };

        self.sink.store(page, image)
    }
}
