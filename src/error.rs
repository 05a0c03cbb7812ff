use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Fatal errors: the job cannot produce an output at all.
///
/// Page-level problems are [`PageFailure`] values carried inside
/// [`crate::pipeline::PageResult`] and never reach this type.
#[derive(Debug, Error)]
pub enum PageCropError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("PDF read error: {0}")]
    PdfReadError(String),

    #[error("PDF write error: {0}")]
    PdfWriteError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Codec error: {0}")]
    CodecError(String),

    #[error("Assembly error: {0}")]
    AssemblyError(String),

    #[error(
        "No pages were produced ({requested} requested); skipped pages: {skipped_pages:?}"
    )]
    NoSuccessfulPages {
        requested: usize,
        skipped_pages: Vec<u32>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`PageCropError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl PageCropError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create a PDF read error.
    pdf_read => PdfReadError,
    /// Create a PDF write error.
    pdf_write => PdfWriteError,
    /// Create a render error.
    render => RenderError,
    /// Create a codec error.
    codec => CodecError,
    /// Create an assembly error.
    assembly => AssemblyError,
}

impl From<lopdf::Error> for PageCropError {
    fn from(e: lopdf::Error) -> Self {
        Self::PdfReadError(e.to_string())
    }
}

impl From<serde_json::Error> for PageCropError {
    fn from(e: serde_json::Error) -> Self {
        Self::IoError(std::io::Error::other(e))
    }
}

impl From<serde_yml::Error> for PageCropError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

#[cfg(feature = "pdfium")]
impl From<pdfium_render::prelude::PdfiumError> for PageCropError {
    fn from(e: pdfium_render::prelude::PdfiumError) -> Self {
        Self::RenderError(e.to_string())
    }
}

impl From<image::ImageError> for PageCropError {
    fn from(e: image::ImageError) -> Self {
        Self::CodecError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PageCropError>;

/// ページ単位の失敗理由。
///
/// Recorded in the page's result and in the run report; processing of the
/// remaining pages always continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageFailure {
    #[error("page {page}: rendering timed out after {millis} ms")]
    RenderTimeout { page: u32, millis: u64 },

    #[error("page {page}: rendering failed: {detail}")]
    RenderError { page: u32, detail: String },

    #[error("page {page}: enhancement failed: {detail}")]
    EnhancementError { page: u32, detail: String },

    #[error("page {page}: image codec failed: {detail}")]
    CodecError { page: u32, detail: String },

    #[error("page {page}: cancelled before start")]
    Cancelled { page: u32 },

    #[error("page {page}: worker panicked: {detail}")]
    WorkerPanic { page: u32, detail: String },

    #[error("page {page}: no result was produced")]
    Missing { page: u32 },
}

impl PageFailure {
    /// 失敗したページ番号(1-based)を返す。
    pub fn page(&self) -> u32 {
        match self {
            Self::RenderTimeout { page, .. }
            | Self::RenderError { page, .. }
            | Self::EnhancementError { page, .. }
            | Self::CodecError { page, .. }
            | Self::Cancelled { page }
            | Self::WorkerPanic { page, .. }
            | Self::Missing { page } => *page,
        }
    }

    pub fn codec(page: u32, detail: impl ToString) -> Self {
        Self::CodecError {
            page,
            detail: detail.to_string(),
        }
    }

    pub fn timeout(page: u32, limit: Duration) -> Self {
        Self::RenderTimeout {
            page,
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn render(page: u32, detail: impl ToString) -> Self {
        Self::RenderError {
            page,
            detail: detail.to_string(),
        }
    }

    pub fn enhancement(page: u32, detail: impl ToString) -> Self {
        Self::EnhancementError {
            page,
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_failure_reports_its_page() {
        assert_eq!(PageFailure::Missing { page: 7 }.page(), 7);
        assert_eq!(PageFailure::codec(3, "bad png").page(), 3);
    }

    #[test]
    fn page_failure_serializes_with_kind_tag() {
        let json = serde_json::to_string(&PageFailure::timeout(2, Duration::from_secs(600)))
            .expect("serialize");
        assert_eq!(json, r#"{"kind":"render_timeout","page":2,"millis":600000}"#);
    }

    #[test]
    fn sub_second_timeout_keeps_its_length() {
        let failure = PageFailure::timeout(4, Duration::from_millis(200));
        assert_eq!(failure, PageFailure::RenderTimeout { page: 4, millis: 200 });
        assert!(failure.to_string().contains("200 ms"), "got: {failure}");
    }

    #[test]
    fn no_successful_pages_lists_skipped() {
        let e = PageCropError::NoSuccessfulPages {
            requested: 2,
            skipped_pages: vec![1, 2],
        };
        assert!(e.to_string().contains("[1, 2]"), "got: {e}");
    }
}
