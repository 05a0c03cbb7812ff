// 画像ページPDFの組立: 1画像 = 1ページ、XObjectとして埋め込み

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use crate::config::settings::PdfImageEncoding;
use crate::error::PageCropError;

/// How page images are embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Resolution the page pixels were rendered at; sets the page size in points.
    pub dpi: u32,
    pub encoding: PdfImageEncoding,
    /// JPEG quality (1-100), used with [`PdfImageEncoding::Jpeg`].
    pub jpeg_quality: u8,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            dpi: 72,
            encoding: PdfImageEncoding::Jpeg,
            jpeg_quality: 95,
        }
    }
}

/// Encoded image stream ready for embedding.
struct EncodedImage {
    data: Vec<u8>,
    filter: &'static str,
    color_space: &'static str,
    width: u32,
    height: u32,
}

/// ページ画像を PDF Image XObject 用にエンコードする。
///
/// グレースケール画像は DeviceGray、それ以外は DeviceRGB に変換する。
fn encode_image(image: &DynamicImage, options: &WriterOptions) -> crate::error::Result<EncodedImage> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PageCropError::pdf_write(format!(
            "cannot embed empty {width}x{height} image"
        )));
    }

    let gray = matches!(
        image,
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_)
    );
    let flattened = if gray {
        DynamicImage::ImageLuma8(image.to_luma8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };
    let color_space = if gray { "DeviceGray" } else { "DeviceRGB" };

    let (data, filter) = match options.encoding {
        PdfImageEncoding::Jpeg => {
            let mut buf = Vec::new();
            let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), options.jpeg_quality);
            flattened
                .write_with_encoder(encoder)
                .map_err(|e| PageCropError::codec(format!("JPEG encode: {e}")))?;
            (buf, "DCTDecode")
        }
        PdfImageEncoding::Flate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(flattened.as_bytes())?;
            (encoder.finish()?, "FlateDecode")
        }
    };

    Ok(EncodedImage {
        data,
        filter,
        color_space,
        width,
        height,
    })
}

/// Builds a PDF whose pages each show exactly one image, full-bleed.
pub struct ImagePdfWriter {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    options: WriterOptions,
}

impl ImagePdfWriter {
    pub fn new(options: WriterOptions) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            options,
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// 画像を1ページとして追加する。戻り値はページのオブジェクトID。
    ///
    /// The image is only borrowed; the caller drops it right after.
    pub fn add_page(&mut self, image: &DynamicImage) -> crate::error::Result<ObjectId> {
        let encoded = encode_image(image, &self.options)?;

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => encoded.width as i64,
                "Height" => encoded.height as i64,
                "ColorSpace" => encoded.color_space,
                "BitsPerComponent" => 8,
                "Filter" => encoded.filter,
            },
            encoded.data,
        ));

        // 1 px = 72/dpi pt
        let scale = 72.0 / self.options.dpi as f32;
        let width_pt = encoded.width as f32 * scale;
        let height_pt = encoded.height as f32 * scale;

        let content = format!("q {width_pt} 0 0 {height_pt} 0 0 cm /Im0 Do Q").into_bytes();
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width_pt),
                Object::Real(height_pt),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(page_id)
    }

    /// Pages ツリーとカタログを確定させ、Document を返す。
    pub fn finish(mut self) -> Document {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc
    }

    /// Finish the document and write it to `path`.
    pub fn save(self, path: &Path) -> crate::error::Result<()> {
        let mut doc = self.finish();
        doc.save(path)
            .map_err(|e| PageCropError::pdf_write(format!("{}: {e}", path.display())))?;
        Ok(())
    }
}
