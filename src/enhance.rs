// 外部高画質化ツール (realesrgan-ncnn-vulkan 等) のCLIラッパー
//
// Invocation: `<executable> -i <input> -o <output> -s <scale>`.
// Success requires exit code 0 and an existing output file.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use image::DynamicImage;
use tracing::debug;

use crate::error::PageFailure;
use crate::process::{ProcessOutcome, describe_status, run_with_timeout};

/// External super-resolution stage.
#[derive(Debug, Clone)]
pub struct Enhancer {
    executable: PathBuf,
    scale: u32,
    timeout: Option<Duration>,
    scratch_root: Option<PathBuf>,
}

impl Enhancer {
    pub fn new(executable: impl Into<PathBuf>, scale: u32) -> Self {
        Self {
            executable: executable.into(),
            scale,
            timeout: None,
            scratch_root: None,
        }
    }

    /// Kill the tool after `timeout`. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Run the tool on one page image.
    ///
    /// The input image is consumed: it is written to a per-page scratch
    /// directory and dropped before the tool starts. Scratch files are removed
    /// when this returns, on every path.
    pub fn enhance(
        &self,
        page_index: u32,
        image: DynamicImage,
    ) -> Result<DynamicImage, PageFailure> {
        let dir_prefix = format!("page_{page_index}_");
        let scratch = crate::scratch_dir(self.scratch_root.as_deref(), &dir_prefix)
            .map_err(|e| PageFailure::enhancement(page_index, format!("scratch dir: {e}")))?;
        let input_path = scratch.path().join(format!("page_{page_index}_in.png"));
        let output_path = scratch.path().join(format!("page_{page_index}_out.png"));
        let stderr_path = scratch.path().join("stderr.log");

        image
            .save_with_format(&input_path, image::ImageFormat::Png)
            .map_err(|e| PageFailure::codec(page_index, format!("write enhancer input: {e}")))?;
        drop(image);

        let stderr = File::create(&stderr_path)
            .map_err(|e| PageFailure::enhancement(page_index, format!("stderr log: {e}")))?;

        let mut command = Command::new(&self.executable);
        command
            .arg("-i")
            .arg(&input_path)
            .arg("-o")
            .arg(&output_path)
            .arg("-s")
            .arg(self.scale.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr);

        debug!(page = page_index, scale = self.scale, "running enhancer");
        let outcome = run_with_timeout(&mut command, self.timeout).map_err(|e| {
            PageFailure::enhancement(
                page_index,
                format!("failed to execute {}: {e}", self.executable.display()),
            )
        })?;

        match outcome {
            ProcessOutcome::TimedOut(limit) => Err(PageFailure::enhancement(
                page_index,
                format!("timed out after {limit:?}"),
            )),
            ProcessOutcome::Exited(status) if !status.success() => {
                let log = std::fs::read_to_string(&stderr_path).unwrap_or_default();
                Err(PageFailure::enhancement(
                    page_index,
                    format!(
                        "exit code {}: {}",
                        describe_status(&status),
                        log.trim()
                    ),
                ))
            }
            ProcessOutcome::Exited(_) if !output_path.exists() => Err(PageFailure::enhancement(
                page_index,
                format!("output file {} was not produced", output_path.display()),
            )),
            ProcessOutcome::Exited(_) => image::open(&output_path)
                .map_err(|e| PageFailure::codec(page_index, format!("read enhancer output: {e}"))),
        }
    }
}
