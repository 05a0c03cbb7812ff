//! Scanned-PDF page pipeline: rasterize each page, crop it to a fixed content
//! region, optionally run an external upscaler, and reassemble the pages into a
//! PDF (in bounded-size chunks) or a set of page images.
//!
//! ```text
//! Dispatcher ──▶ PageWorker ──▶ OrderedCollector ──▶ ChunkedAssembler
//! (rayon pool)   render/crop/     (reorder, gaps)     (chunk PDFs → merge)
//!                enhance/resize
//! ```

pub mod config;
pub mod enhance;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod process;
pub mod render;
pub mod report;
pub mod transform;

use std::path::Path;

/// Scratch directory under `root` (system temp dir if `None`), removed when
/// the returned guard drops.
///
/// The random suffix after `prefix` keeps concurrent workers and concurrent
/// runs from colliding.
pub(crate) fn scratch_dir(root: Option<&Path>, prefix: &str) -> std::io::Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
}
