// 実行レポート: report.json をランディレクトリに書き出す

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::PageFailure;

pub const REPORT_FILE_NAME: &str = "report.json";

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    /// Combined PDF, when one was produced.
    pub output: Option<PathBuf>,
    pub output_sha256: Option<String>,
    /// `"start-end"`, or `"(empty)"`.
    pub pages: String,
    pub requested: usize,
    pub succeeded: usize,
    pub skipped_pages: Vec<u32>,
    pub failures: BTreeMap<u32, PageFailure>,
    pub chunk_sizes: Vec<usize>,
    /// Local time the run started, RFC 3339.
    pub started_at: String,
}

impl RunReport {
    /// Serialize to `run_dir/report.json` and return its path.
    pub fn write(&self, run_dir: &Path) -> crate::error::Result<PathBuf> {
        let path = run_dir.join(REPORT_FILE_NAME);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// SHA-256 of a file, hex-encoded. Reads in blocks; the file is never fully
/// loaded.
pub fn file_sha256(path: &Path) -> crate::error::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
