//! Page pipeline stages.
//!
//! 1. [`dispatcher`]: one rayon pool per job, one task per page, bounded in-flight
//! 2. [`page_worker`]: render → crop → enhance → resize → sink, failures contained
//! 3. [`collector`]: restores ascending page order, records gaps
//! 4. [`assembler`]: chunked PDF assembly and merge
//! 5. [`job_runner`] / [`orchestrator`]: wiring for one job / many jobs

pub mod assembler;
pub mod collector;
pub mod dispatcher;
pub mod job_runner;
pub mod orchestrator;
pub mod page_worker;

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;

use crate::error::PageFailure;
use crate::render::Rasterizer;

/// One page of one source document.
#[derive(Clone)]
pub struct PageDescriptor {
    pub source: Arc<dyn Rasterizer>,
    /// 1-based.
    pub page_index: u32,
    pub dpi: u32,
}

impl std::fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("page_index", &self.page_index)
            .field("dpi", &self.dpi)
            .finish_non_exhaustive()
    }
}

/// 処理済みページの実体: メモリ上の画像、またはエンコード済みファイル。
#[derive(Debug)]
pub enum PageArtifact {
    Image(DynamicImage),
    File(PathBuf),
}

impl PageArtifact {
    /// Decode the artifact into memory (files are loaded, images moved out).
    pub fn into_image(self) -> crate::error::Result<DynamicImage> {
        match self {
            PageArtifact::Image(image) => Ok(image),
            PageArtifact::File(path) => image::open(&path).map_err(|e| {
                crate::error::PageCropError::codec(format!("{}: {e}", path.display()))
            }),
        }
    }
}

/// Outcome of one requested page. Exactly one exists per requested index.
#[derive(Debug)]
pub struct PageResult {
    pub page_index: u32,
    pub outcome: Result<PageArtifact, PageFailure>,
}

impl PageResult {
    pub fn ok(page_index: u32, artifact: PageArtifact) -> Self {
        Self {
            page_index,
            outcome: Ok(artifact),
        }
    }

    pub fn failed(failure: PageFailure) -> Self {
        Self {
            page_index: failure.page(),
            outcome: Err(failure),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// A successful page released by the collector in ascending order.
#[derive(Debug)]
pub struct OrderedPage {
    pub page_index: u32,
    pub artifact: PageArtifact,
}
