use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pdf_pagecrop::config::job::JobFile;
use pdf_pagecrop::config::merged::MergedConfig;
use pdf_pagecrop::config::{self, resolve_path};
use pdf_pagecrop::pipeline::job_runner::JobConfig;
use pdf_pagecrop::pipeline::orchestrator::run_all_jobs;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: pdf_pagecrop <jobs.yaml>...");
        eprintln!("  Render, crop and reassemble scanned PDF pages according to job files.");
        eprintln!("  settings.yaml next to each job file is loaded automatically.");
        eprintln!("  Log level: RUST_LOG (default: info).");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_pagecrop {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut job_configs: Vec<JobConfig> = Vec::new();

    for job_file_arg in &args {
        let job_file_path = Path::new(job_file_arg);

        // Load settings from the same directory as the job file.
        let settings = match config::load_settings_for_job(job_file_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: Failed to load settings for {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let yaml_content = match std::fs::read_to_string(job_file_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ERROR: Failed to read job file {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_file: JobFile = match serde_yml::from_str(&yaml_content) {
            Ok(jf) => jf,
            Err(e) => {
                eprintln!("ERROR: Failed to parse job file {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        // Relative paths in both files are relative to the job file directory.
        let job_dir = job_file_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        for job in &job_file.jobs {
            let mut merged = MergedConfig::new(&settings, job);
            merged.enhance.executable = resolve_tool(&job_dir, &merged.enhance.executable);
            merged.pdftoppm_path = resolve_tool(&job_dir, &merged.pdftoppm_path);
            merged.scratch_dir = merged
                .scratch_dir
                .as_ref()
                .map(|dir| resolve_path(&job_dir, &dir.to_string_lossy()));

            if let Err(e) = merged.validate() {
                eprintln!("ERROR: {job_file_arg}: {}: {e}", job.input);
                return ExitCode::FAILURE;
            }

            job_configs.push(JobConfig {
                input_path: resolve_path(&job_dir, &job.input),
                output_dir: resolve_path(&job_dir, &job.output),
                pages: job.pages,
                config: merged,
            });
        }
    }

    let results = run_all_jobs(&job_configs);

    let mut has_error = false;
    for (job, result) in job_configs.iter().zip(&results) {
        match result {
            Ok(job_result) => {
                let target = job_result
                    .output_path
                    .as_ref()
                    .or(job_result.run_dir.as_ref());
                match target {
                    Some(target) => eprintln!(
                        "OK: {} -> {} ({} pages, {} failed, skipped: {:?})",
                        job_result.input_path.display(),
                        target.display(),
                        job_result.succeeded,
                        job_result.skipped_pages.len(),
                        job_result.skipped_pages
                    ),
                    None => eprintln!(
                        "OK: {}: empty page range, no output produced",
                        job_result.input_path.display()
                    ),
                }
            }
            Err(e) => {
                eprintln!(
                    "ERROR: {} -> {}: {e} (no output produced)",
                    job.input_path.display(),
                    job.output_dir.display()
                );
                has_error = true;
            }
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// A bare program name is looked up on PATH; anything with a directory part
/// is resolved against the job file directory.
fn resolve_tool(base_dir: &Path, tool: &Path) -> PathBuf {
    if tool.components().count() > 1 {
        resolve_path(base_dir, &tool.to_string_lossy())
    } else {
        tool.to_path_buf()
    }
}
