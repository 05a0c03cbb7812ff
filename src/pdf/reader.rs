use std::path::Path;

use lopdf::Document;

pub struct PdfReader {
    doc: Document,
}

impl PdfReader {
    /// PDFファイルを開いてPdfReaderを作成する。
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let doc = Document::load(path).map_err(|e| {
            crate::error::PageCropError::pdf_read(format!("{}: {e}", path.display()))
        })?;
        Ok(Self { doc })
    }

    /// 内部のlopdf Documentへの参照を返す。
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// ページ数を返す。
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// 指定ページ(1-indexed)のMediaBox幅・高さ(pt)を返す。
    pub fn page_dimensions(&self, page_num: u32) -> crate::error::Result<(f64, f64)> {
        let page_id = *self.doc.get_pages().get(&page_num).ok_or_else(|| {
            crate::error::PageCropError::pdf_read(format!("page {page_num} not found"))
        })?;
        let page_dict = self.doc.get_dictionary(page_id)?;
        let media_box = page_dict.get(b"MediaBox")?.as_array()?;
        if media_box.len() < 4 {
            return Err(crate::error::PageCropError::pdf_read("Invalid MediaBox"));
        }

        // MediaBoxの値は整数または実数の可能性がある
        let to_f64 = |obj: &lopdf::Object| -> crate::error::Result<f64> {
            match obj {
                lopdf::Object::Integer(i) => Ok(*i as f64),
                lopdf::Object::Real(f) => Ok(*f as f64),
                _ => Err(crate::error::PageCropError::pdf_read(
                    "Invalid MediaBox value",
                )),
            }
        };

        let width = (to_f64(&media_box[2])? - to_f64(&media_box[0])?).abs();
        let height = (to_f64(&media_box[3])? - to_f64(&media_box[1])?).abs();
        Ok((width, height))
    }
}
