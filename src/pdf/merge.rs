// チャンクPDFの結合: 各チャンクのページを順番どおり1つのDocumentへ移す
//
// Chunk documents come from ImagePdfWriter: one flat Pages node, no
// outlines, no shared resources. Each chunk is loaded, renumbered past the
// objects already merged, and moved in whole, so only one chunk's object
// table is parsed at a time.

use std::path::Path;

use lopdf::{Document, Object, ObjectId, dictionary};
use tracing::debug;

use crate::error::PageCropError;

fn is_dictionary_of_type(object: &Object, type_name: &[u8]) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|d| d.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
        == Some(type_name)
}

/// 複数のPDFを順番に連結した1つのDocumentを作る。
///
/// Page order is: all pages of `paths[0]` in their own order, then
/// `paths[1]`, and so on.
pub fn merge_documents<P: AsRef<Path>>(paths: &[P]) -> crate::error::Result<Document> {
    let mut merged = Document::with_version("1.5");
    let pages_id = merged.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let mut chunk = Document::load(path).map_err(|e| {
            PageCropError::assembly(format!("load chunk {}: {e}", path.display()))
        })?;
        chunk.renumber_objects_with(merged.max_id + 1);

        let page_ids: Vec<ObjectId> = chunk.get_pages().into_values().collect();
        debug!(chunk = %path.display(), pages = page_ids.len(), "merging chunk");

        for (id, mut object) in std::mem::take(&mut chunk.objects) {
            if is_dictionary_of_type(&object, b"Catalog") || is_dictionary_of_type(&object, b"Pages")
            {
                continue;
            }
            if is_dictionary_of_type(&object, b"Page")
                && let Ok(dict) = object.as_dict_mut()
            {
                dict.set("Parent", pages_id);
            }
            merged.objects.insert(id, object);
        }
        merged.max_id = merged.max_id.max(chunk.max_id);
        kids.extend(page_ids.into_iter().map(Object::Reference));
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    Ok(merged)
}
