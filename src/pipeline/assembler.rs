// チャンク分割PDF組立: N ページごとに一時PDFへ書き出し、最後に結合する
//
// Phase 1: pages are buffered until `chunk_size` are pending, then written
//          to `chunk_<n>.pdf` in a scratch directory and released.
// Phase 2: chunk PDFs are merged in order into the output file, written
//          atomically (temp file in the output directory + rename).

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

use super::{OrderedPage, PageResult};
use crate::error::PageCropError;
use crate::pdf::merge::merge_documents;
use crate::pdf::writer::{ImagePdfWriter, WriterOptions};

/// Result of [`ChunkedAssembler::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// No successful page was pushed; no file was created.
    NothingToAssemble,
    Assembled {
        output_path: PathBuf,
        page_count: usize,
        /// Pages per intermediate chunk, in chunk order.
        chunk_sizes: Vec<usize>,
    },
}

pub struct ChunkedAssembler {
    chunk_size: usize,
    options: WriterOptions,
    scratch: TempDir,
    pending: Vec<OrderedPage>,
    chunk_paths: Vec<PathBuf>,
    chunk_sizes: Vec<usize>,
    last_index: Option<u32>,
}

impl ChunkedAssembler {
    /// `scratch_root` holds the chunk directory; `None` uses the system temp dir.
    pub fn new(
        chunk_size: usize,
        options: WriterOptions,
        scratch_root: Option<&Path>,
    ) -> crate::error::Result<Self> {
        if chunk_size == 0 {
            return Err(PageCropError::config("chunk_size must be positive"));
        }
        let scratch = crate::scratch_dir(scratch_root, "chunks_")?;
        Ok(Self {
            chunk_size,
            options,
            scratch,
            pending: Vec::with_capacity(chunk_size),
            chunk_paths: Vec::new(),
            chunk_sizes: Vec::new(),
            last_index: None,
        })
    }

    /// Pages pushed so far, including the ones already written to chunks.
    pub fn page_count(&self) -> usize {
        self.chunk_sizes.iter().sum::<usize>() + self.pending.len()
    }

    /// Add the next page. Indices must be strictly increasing.
    pub fn push(&mut self, page: OrderedPage) -> crate::error::Result<()> {
        if let Some(last) = self.last_index
            && page.page_index <= last
        {
            return Err(PageCropError::assembly(format!(
                "page {} pushed after page {last}",
                page.page_index
            )));
        }
        self.last_index = Some(page.page_index);
        self.pending.push(page);
        if self.pending.len() >= self.chunk_size {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> crate::error::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk_no = self.chunk_paths.len();
        let path = self.scratch.path().join(format!("chunk_{chunk_no:04}.pdf"));
        let pages = std::mem::take(&mut self.pending);
        let size = pages.len();
        let first = pages.first().map(|p| p.page_index);
        let last = pages.last().map(|p| p.page_index);

        let mut writer = ImagePdfWriter::new(self.options);
        for page in pages {
            let index = page.page_index;
            let context =
                |e: PageCropError| PageCropError::assembly(format!("chunk {chunk_no}, page {index}: {e}"));
            // decoded image lives only until it is embedded
            let image = page.artifact.into_image().map_err(context)?;
            writer.add_page(&image).map_err(context)?;
        }
        writer
            .save(&path)
            .map_err(|e| PageCropError::assembly(format!("chunk {chunk_no}: {e}")))?;

        debug!(chunk = chunk_no, pages = size, ?first, ?last, "chunk written");
        self.chunk_paths.push(path);
        self.chunk_sizes.push(size);
        Ok(())
    }

    /// Write the last chunk, merge all chunks into `output_path` and remove
    /// the chunk files.
    pub fn finish(mut self, output_path: &Path) -> crate::error::Result<AssemblyOutcome> {
        self.flush_chunk()?;
        if self.chunk_paths.is_empty() {
            info!("nothing to assemble");
            return Ok(AssemblyOutcome::NothingToAssemble);
        }

        let mut merged = merge_documents(&self.chunk_paths)?;
        let page_count = merged.get_pages().len();

        let parent = match output_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let mut tmp = NamedTempFile::new_in(&parent)?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            merged
                .save_to(&mut out)
                .map_err(|e| PageCropError::pdf_write(e.to_string()))?;
            out.flush()?;
        }
        tmp.persist(output_path).map_err(|e| {
            PageCropError::assembly(format!("{}: {}", output_path.display(), e.error))
        })?;

        info!(
            output = %output_path.display(),
            pages = page_count,
            chunks = self.chunk_sizes.len(),
            "assembled"
        );
        Ok(AssemblyOutcome::Assembled {
            output_path: output_path.to_path_buf(),
            page_count,
            chunk_sizes: self.chunk_sizes,
        })
    }
}

/// One-shot form: keep the successful results (already in ascending order)
/// and assemble them into `output_path`.
pub fn assemble<I>(
    results: I,
    chunk_size: usize,
    options: WriterOptions,
    output_path: &Path,
) -> crate::error::Result<AssemblyOutcome>
where
    I: IntoIterator<Item = PageResult>,
{
    let mut assembler = ChunkedAssembler::new(chunk_size, options, None)?;
    for result in results {
        if let Ok(artifact) = result.outcome {
            assembler.push(OrderedPage {
                page_index: result.page_index,
                artifact,
            })?;
        }
    }
    assembler.finish(output_path)
}
