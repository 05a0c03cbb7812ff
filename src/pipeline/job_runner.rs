// ジョブ単位: 入力を開く → 並列ページ処理 → 順序復元 → チャンク組立 → レポート

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::assembler::{AssemblyOutcome, ChunkedAssembler};
use super::collector::OrderedCollector;
use super::dispatcher::{CancellationToken, Dispatcher};
use super::page_worker::{ArtifactSink, PageWorker, WorkerConfig};
use super::{OrderedPage, PageDescriptor};
use crate::config::job::PageRange;
use crate::config::merged::MergedConfig;
use crate::config::settings::{ImageFormat, OutputMode, RasterizerKind};
use crate::enhance::Enhancer;
use crate::error::{PageCropError, PageFailure};
use crate::pdf::writer::WriterOptions;
use crate::render::Rasterizer;
use crate::render::image_dir::ImageDirSource;
use crate::render::pdftoppm::PdftoppmRasterizer;
use crate::report::{RunReport, file_sha256};

pub const COMBINED_PDF_NAME: &str = "output_combined.pdf";
const RUN_DIR_PREFIX: &str = "processed_output_";

/// Configuration for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// PDF file or directory of `page_<n>` images.
    pub input_path: PathBuf,
    /// Parent of the timestamped run directory.
    pub output_dir: PathBuf,
    /// `None` means every page.
    pub pages: Option<PageRange>,
    pub config: MergedConfig,
}

/// Result of processing a single job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub input_path: PathBuf,
    /// `None` when the range was empty and nothing ran.
    pub run_dir: Option<PathBuf>,
    /// Combined PDF (pdf mode only).
    pub output_path: Option<PathBuf>,
    pub requested: usize,
    pub succeeded: usize,
    pub skipped_pages: Vec<u32>,
    pub failures: BTreeMap<u32, PageFailure>,
    pub chunk_sizes: Vec<usize>,
}

impl JobResult {
    fn empty(input_path: &Path) -> Self {
        JobResult {
            input_path: input_path.to_path_buf(),
            run_dir: None,
            output_path: None,
            requested: 0,
            succeeded: 0,
            skipped_pages: Vec::new(),
            failures: BTreeMap::new(),
            chunk_sizes: Vec::new(),
        }
    }
}

/// 入力パスに応じたページソースを開く。
///
/// A directory is read as page images; anything else is a PDF rendered by the
/// configured backend.
pub fn open_source(
    input_path: &Path,
    config: &MergedConfig,
) -> crate::error::Result<Arc<dyn Rasterizer>> {
    if input_path.is_dir() {
        return Ok(Arc::new(ImageDirSource::open(input_path)?));
    }
    if !input_path.is_file() {
        return Err(PageCropError::pdf_read(format!(
            "input not found: {}",
            input_path.display()
        )));
    }

    match config.rasterizer {
        RasterizerKind::Pdftoppm => {
            let mut rasterizer = PdftoppmRasterizer::new(input_path, &config.pdftoppm_path);
            if let Some(root) = &config.scratch_dir {
                rasterizer = rasterizer.with_scratch_root(root);
            }
            Ok(Arc::new(rasterizer))
        }
        #[cfg(feature = "pdfium")]
        RasterizerKind::Pdfium => Ok(Arc::new(crate::render::pdfium::PdfiumRasterizer::new(
            input_path,
        ))),
        #[cfg(not(feature = "pdfium"))]
        RasterizerKind::Pdfium => Err(PageCropError::config(
            "rasterizer 'pdfium' requires the `pdfium` feature; use 'pdftoppm'",
        )),
    }
}

/// Run a single job: open the input, then [`run_pipeline`].
pub fn run_job(job: &JobConfig) -> crate::error::Result<JobResult> {
    job.config.validate()?;
    let source = open_source(&job.input_path, &job.config)?;
    run_pipeline(source, &job.input_path, job.pages, &job.config, &job.output_dir)
}

/// Create `<output_dir>/processed_output_<stamp>`, adding `_<n>` if a run in
/// the same second already took the name.
fn create_run_dir(output_dir: &Path, stamp: &str) -> crate::error::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let mut candidate = output_dir.join(format!("{RUN_DIR_PREFIX}{stamp}"));
    let mut n = 1;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = output_dir.join(format!("{RUN_DIR_PREFIX}{stamp}_{n}"));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Run the page pipeline for `source` and write the outputs under
/// `output_dir`.
///
/// Phase A: validate the page range against the source
/// Phase B: dispatch pages to the worker pool (rayon, `parallel_workers`)
/// Phase C: reorder results and feed the chunked assembler as they arrive
/// Phase D: merge chunks (pdf mode) and write `report.json`
pub fn run_pipeline(
    source: Arc<dyn Rasterizer>,
    input_path: &Path,
    pages: Option<PageRange>,
    config: &MergedConfig,
    output_dir: &Path,
) -> crate::error::Result<JobResult> {
    // --- Phase A ---
    let page_count = source.page_count()?;
    let range = pages.unwrap_or_else(|| PageRange::all(page_count));
    if !range.is_empty() && (range.start == 0 || range.end > page_count) {
        return Err(PageCropError::config(format!(
            "page range {range} out of range (document has {page_count} pages)"
        )));
    }
    if range.is_empty() {
        info!(input = %input_path.display(), "empty page range: nothing to assemble");
        return Ok(JobResult::empty(input_path));
    }

    let started = chrono::Local::now();
    let run_dir = create_run_dir(output_dir, &started.format("%Y%m%d_%H%M%S").to_string())?;
    info!(
        input = %input_path.display(),
        run_dir = %run_dir.display(),
        pages = %range,
        workers = config.parallel_workers,
        "job started"
    );

    // pdf mode: pages go to a scratch dir as PNG and are decoded again per chunk,
    // so out-of-order pages waiting in the collector cost disk, not memory
    let page_scratch = match config.output_mode {
        OutputMode::Pdf => Some(crate::scratch_dir(config.scratch_dir.as_deref(), "pages_")?),
        OutputMode::Images => None,
    };
    let sink = match &page_scratch {
        Some(scratch) => ArtifactSink::Directory {
            dir: scratch.path().to_path_buf(),
            format: ImageFormat::Png,
            jpeg_quality: config.jpeg_quality,
        },
        None => ArtifactSink::Directory {
            dir: run_dir.clone(),
            format: config.image_format,
            jpeg_quality: config.jpeg_quality,
        },
    };

    let enhancer = config.enhance.enabled.then(|| {
        Enhancer::new(&config.enhance.executable, config.enhance.scale)
            .with_timeout(config.enhance_timeout())
            .with_scratch_root(config.scratch_dir.clone())
    });
    let scale = if config.enhance.enabled {
        config.enhance.scale
    } else {
        1
    };
    let worker = PageWorker::new(WorkerConfig::from_merged(config), sink).with_enhancer(enhancer);

    let mut assembler = match config.output_mode {
        OutputMode::Pdf => Some(ChunkedAssembler::new(
            config.chunk_size,
            WriterOptions {
                dpi: config.dpi.saturating_mul(scale),
                encoding: config.pdf_encoding,
                jpeg_quality: config.jpeg_quality,
            },
            config.scratch_dir.as_deref(),
        )?),
        OutputMode::Images => None,
    };

    // --- Phase B ---
    let dispatcher = Dispatcher::new(config.parallel_workers)?;
    let dpi = config.dpi;
    let stream = dispatcher.run(range, CancellationToken::new(), move |page_index| {
        worker.render_and_transform(&PageDescriptor {
            source: Arc::clone(&source),
            page_index,
            dpi,
        })
    });

    // --- Phase C ---
    let mut collector = OrderedCollector::new(range);
    let mut feed = |ready: Vec<OrderedPage>| -> crate::error::Result<()> {
        if let Some(assembler) = assembler.as_mut() {
            for page in ready {
                assembler.push(page)?;
            }
        }
        Ok(())
    };
    let streamed = stream
        .map(|result| feed(collector.push(result)))
        .collect::<crate::error::Result<()>>();
    if let Err(e) = streamed {
        // only removes the run dir if nothing was written into it
        let _ = std::fs::remove_dir(&run_dir);
        return Err(e);
    }
    let (rest, summary) = collector.finish();
    if let Err(e) = feed(rest) {
        let _ = std::fs::remove_dir(&run_dir);
        return Err(e);
    }

    let skipped_pages = summary.skipped_pages();
    if !skipped_pages.is_empty() {
        warn!(skipped = ?skipped_pages, "pages skipped");
    }
    if summary.succeeded == 0 {
        let _ = std::fs::remove_dir(&run_dir);
        return Err(PageCropError::NoSuccessfulPages {
            requested: summary.requested,
            skipped_pages,
        });
    }

    // --- Phase D ---
    let (output_path, chunk_sizes) = match assembler {
        Some(assembler) => match assembler.finish(&run_dir.join(COMBINED_PDF_NAME)) {
            Ok(AssemblyOutcome::Assembled {
                output_path,
                chunk_sizes,
                ..
            }) => (Some(output_path), chunk_sizes),
            Ok(AssemblyOutcome::NothingToAssemble) => (None, Vec::new()),
            Err(e) => {
                let _ = std::fs::remove_dir(&run_dir);
                return Err(e);
            }
        },
        None => (None, Vec::new()),
    };
    drop(page_scratch);

    let output_sha256 = output_path.as_deref().map(file_sha256).transpose()?;
    let report = RunReport {
        input: input_path.to_path_buf(),
        output: output_path.clone(),
        output_sha256,
        pages: range.to_string(),
        requested: summary.requested,
        succeeded: summary.succeeded,
        skipped_pages: skipped_pages.clone(),
        failures: summary.failures.clone(),
        chunk_sizes: chunk_sizes.clone(),
        started_at: started.to_rfc3339(),
    };
    report.write(&run_dir)?;

    info!(
        succeeded = summary.succeeded,
        failed = skipped_pages.len(),
        run_dir = %run_dir.display(),
        "job finished"
    );

    Ok(JobResult {
        input_path: input_path.to_path_buf(),
        run_dir: Some(run_dir),
        output_path,
        requested: summary.requested,
        succeeded: summary.succeeded,
        skipped_pages,
        failures: summary.failures,
        chunk_sizes,
    })
}
