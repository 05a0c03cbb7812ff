// 並列ページ処理: ジョブ全体で1つのrayonプールを使い、1ページ1タスクで投入する
//
// Results come back over a bounded crossbeam channel in completion order.
// Ordering is the collector's job, not ours.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Receiver;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use super::PageResult;
use crate::config::job::PageRange;
use crate::error::{PageCropError, PageFailure};

/// Shared stop flag. Once set, pages that have not started report
/// [`PageFailure::Cancelled`]; pages already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed-size worker pool, built once and reused for a whole page range.
pub struct Dispatcher {
    pool: ThreadPool,
    worker_count: usize,
}

impl Dispatcher {
    pub fn new(worker_count: usize) -> crate::error::Result<Self> {
        if worker_count == 0 {
            return Err(PageCropError::config("worker_count must be positive"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("page-worker-{i}"))
            .build()
            .map_err(|e| PageCropError::config(format!("thread pool: {e}")))?;
        Ok(Self { pool, worker_count })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// ページ範囲の各ページに対して `job` を1回ずつ実行する。
    ///
    /// Returns immediately; results are pulled from the returned stream.
    /// Exactly one [`PageResult`] is produced per page in `range`: a panic in
    /// `job` becomes [`PageFailure::WorkerPanic`], a cancelled page becomes
    /// [`PageFailure::Cancelled`].
    pub fn run<F>(&self, range: PageRange, cancel: CancellationToken, job: F) -> PageStream
    where
        F: Fn(u32) -> PageResult + Send + Sync + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(self.worker_count);
        let job = Arc::new(job);

        debug!(%range, workers = self.worker_count, "dispatching pages");
        for page in range.iter() {
            let tx = tx.clone();
            let job = Arc::clone(&job);
            let cancel = cancel.clone();
            self.pool.spawn(move || {
                let result = if cancel.is_cancelled() {
                    PageResult::failed(PageFailure::Cancelled { page })
                } else {
                    run_isolated(page, job.as_ref())
                };
                // the stream may already be gone
                let _ = tx.send(result);
            });
        }

        PageStream {
            rx,
            remaining: range.len(),
            cancel,
        }
    }
}

fn run_isolated<F>(page: u32, job: &F) -> PageResult
where
    F: Fn(u32) -> PageResult,
{
    match catch_unwind(AssertUnwindSafe(|| job(page))) {
        Ok(result) => {
            debug_assert_eq!(result.page_index, page, "job returned a result for another page");
            result
        }
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            warn!(page, %detail, "page worker panicked");
            PageResult::failed(PageFailure::WorkerPanic { page, detail })
        }
    }
}

/// Unordered stream of page results.
///
/// Ends after one result per requested page. Dropping it before the end
/// cancels the remaining pages.
pub struct PageStream {
    rx: Receiver<PageResult>,
    remaining: usize,
    cancel: CancellationToken,
}

impl Iterator for PageStream {
    type Item = PageResult;

    fn next(&mut self) -> Option<PageResult> {
        if self.remaining == 0 {
            return None;
        }
        let result = self.rx.recv().ok()?;
        self.remaining -= 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl Drop for PageStream {
    fn drop(&mut self) {
        if self.remaining > 0 {
            self.cancel.cancel();
        }
    }
}
