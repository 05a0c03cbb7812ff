// poppler pdftoppm CLI wrapper: 1ページずつPNGに描画し、タイムアウト時はkill

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use image::DynamicImage;
use tracing::debug;

use super::Rasterizer;
use crate::error::PageFailure;
use crate::process::{ProcessOutcome, describe_status, run_with_timeout};

/// Subprocess backend. Unlike in-process rendering, a stuck render is
/// actually terminated when the timeout expires.
pub struct PdftoppmRasterizer {
    pdf_path: PathBuf,
    executable: PathBuf,
    scratch_root: Option<PathBuf>,
}

impl PdftoppmRasterizer {
    pub fn new(pdf_path: impl Into<PathBuf>, executable: impl Into<PathBuf>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            executable: executable.into(),
            scratch_root: None,
        }
    }

    /// Directory under which per-page scratch directories are created
    /// (system temp dir by default).
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn page_count(&self) -> crate::error::Result<u32> {
        Ok(crate::pdf::reader::PdfReader::open(&self.pdf_path)?.page_count())
    }

    fn render_page(
        &self,
        page_index: u32,
        dpi: u32,
        timeout: Option<Duration>,
    ) -> Result<DynamicImage, PageFailure> {
        let dir_prefix = format!("page_{page_index}_");
        let scratch = crate::scratch_dir(self.scratch_root.as_deref(), &dir_prefix)
            .map_err(|e| PageFailure::render(page_index, format!("scratch dir: {e}")))?;
        let prefix = scratch.path().join("render");
        let stderr_path = scratch.path().join("stderr.log");
        let stderr = File::create(&stderr_path)
            .map_err(|e| PageFailure::render(page_index, format!("stderr log: {e}")))?;

        let page = page_index.to_string();
        let mut command = Command::new(&self.executable);
        command
            .arg("-r")
            .arg(dpi.to_string())
            .args(["-f", &page, "-l", &page])
            .args(["-png", "-singlefile"])
            .arg(&self.pdf_path)
            .arg(&prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr);

        debug!(page = page_index, dpi, "running pdftoppm");
        let outcome = run_with_timeout(&mut command, timeout).map_err(|e| {
            PageFailure::render(
                page_index,
                format!("failed to execute {}: {e}", self.executable.display()),
            )
        })?;

        match outcome {
            ProcessOutcome::TimedOut(limit) => Err(PageFailure::timeout(page_index, limit)),
            ProcessOutcome::Exited(status) if !status.success() => {
                let log = std::fs::read_to_string(&stderr_path).unwrap_or_default();
                Err(PageFailure::render(
                    page_index,
                    format!(
                        "pdftoppm failed (exit code {}): {}",
                        describe_status(&status),
                        log.trim()
                    ),
                ))
            }
            ProcessOutcome::Exited(_) => {
                let png = prefix.with_extension("png");
                image::open(&png).map_err(|e| {
                    PageFailure::render(page_index, format!("{}: {e}", png.display()))
                })
            }
        }
    }
}
