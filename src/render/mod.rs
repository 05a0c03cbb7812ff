//! Page sources: anything that can turn a 1-based page index into a bitmap.
//!
//! The pipeline only sees the [`Rasterizer`] trait. Backends:
//!
//! * [`pdfium::PdfiumRasterizer`]: in-process pdfium (feature `pdfium`)
//! * [`pdftoppm::PdftoppmRasterizer`]: poppler's `pdftoppm` as a subprocess
//! * [`image_dir::ImageDirSource`]: a directory of `page_<n>` images

#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod image_dir;
pub mod pdftoppm;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::DynamicImage;
use tracing::warn;

use crate::error::PageFailure;

/// A source document that renders one page at a time.
///
/// Implementations must be shareable across worker threads. Backends that can
/// block must honour `timeout` by returning [`PageFailure::RenderTimeout`]
/// instead of holding the caller past the deadline.
pub trait Rasterizer: Send + Sync {
    /// Number of addressable pages (the highest valid 1-based index).
    fn page_count(&self) -> crate::error::Result<u32>;

    /// Render page `page_index` (1-based) at `dpi`.
    fn render_page(
        &self,
        page_index: u32,
        dpi: u32,
        timeout: Option<Duration>,
    ) -> std::result::Result<DynamicImage, PageFailure>;
}

#[cfg_attr(not(feature = "pdfium"), allow(dead_code))]
const GATE_POLL: Duration = Duration::from_millis(20);

/// Returns the gate permit when the holder finishes, even by unwinding.
#[cfg_attr(not(feature = "pdfium"), allow(dead_code))]
struct Permit(Sender<()>);

impl Drop for Permit {
    fn drop(&mut self) {
        // capacity 1 and only one permit exists
        let _ = self.0.send(());
    }
}

/// 割り込み不能なインプロセス描画を直列化し、期限を課す。
///
/// One render runs at a time, and the deadline counts from the moment the
/// render starts rather than from when the caller began waiting. A render
/// that misses its deadline is detached on its helper thread, still holding
/// the permit, and the gate is poisoned: every later call fails at once with
/// a render error instead of queuing behind the hung page.
#[cfg_attr(not(feature = "pdfium"), allow(dead_code))]
pub(crate) struct RenderGate {
    permit_tx: Sender<()>,
    permit_rx: Receiver<()>,
    poisoned: AtomicBool,
}

#[cfg_attr(not(feature = "pdfium"), allow(dead_code))]
impl RenderGate {
    pub(crate) fn new() -> Self {
        let (permit_tx, permit_rx) = crossbeam_channel::bounded(1);
        let _ = permit_tx.send(());
        Self {
            permit_tx,
            permit_rx,
            poisoned: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    fn acquire(&self, page_index: u32) -> std::result::Result<Permit, PageFailure> {
        loop {
            if self.is_poisoned() {
                return Err(PageFailure::render(
                    page_index,
                    "renderer disabled after an earlier page hung",
                ));
            }
            match self.permit_rx.recv_timeout(GATE_POLL) {
                Ok(()) => return Ok(Permit(self.permit_tx.clone())),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PageFailure::render(page_index, "render gate closed"));
                }
            }
        }
    }

    /// Wait for the gate, then run `render` with `timeout` measured from its start.
    pub(crate) fn run<F>(
        &self,
        page_index: u32,
        timeout: Option<Duration>,
        render: F,
    ) -> std::result::Result<DynamicImage, PageFailure>
    where
        F: FnOnce() -> crate::error::Result<DynamicImage> + Send + 'static,
    {
        let permit = self.acquire(page_index)?;
        let Some(timeout) = timeout else {
            let result = render();
            drop(permit);
            return result.map_err(|e| PageFailure::render(page_index, e));
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::Builder::new()
            .name(format!("render-page-{page_index}"))
            .spawn(move || {
                let result = render();
                drop(permit);
                // receiver is gone after a timeout
                let _ = tx.send(result);
            })
            .map_err(|e| PageFailure::render(page_index, format!("spawn render thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(|e| PageFailure::render(page_index, e)),
            Err(RecvTimeoutError::Timeout) => {
                self.poisoned.store(true, Ordering::SeqCst);
                warn!(
                    page = page_index,
                    "render exceeded {:?}; in-process renderer disabled",
                    timeout
                );
                Err(PageFailure::timeout(page_index, timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PageFailure::render(
                page_index,
                "render thread exited without a result",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn blank() -> crate::error::Result<DynamicImage> {
        Ok(DynamicImage::ImageRgb8(RgbImage::new(4, 3)))
    }

    #[test]
    fn gate_passes_through_fast_render() {
        let gate = RenderGate::new();
        let img = gate
            .run(1, Some(Duration::from_secs(5)), blank)
            .expect("render should finish");
        assert_eq!((img.width(), img.height()), (4, 3));
        // permit came back
        assert!(gate.run(2, Some(Duration::from_secs(5)), blank).is_ok());
        assert!(!gate.is_poisoned());
    }

    #[test]
    fn gate_reports_timeout_in_millis() {
        let gate = RenderGate::new();
        let result = gate.run(9, Some(Duration::from_millis(50)), || {
            std::thread::sleep(Duration::from_millis(500));
            blank()
        });
        assert_eq!(
            result.unwrap_err(),
            PageFailure::RenderTimeout {
                page: 9,
                millis: 50
            }
        );
        assert!(gate.is_poisoned());
    }

    #[test]
    fn gate_maps_render_errors() {
        let gate = RenderGate::new();
        let result = gate.run(2, None, || {
            Err(crate::error::PageCropError::render("broken page"))
        });
        match result {
            Err(PageFailure::RenderError { page, detail }) => {
                assert_eq!(page, 2);
                assert!(detail.contains("broken page"));
            }
            other => panic!("expected RenderError, got {other:?}"),
        }
        assert!(!gate.is_poisoned());
    }

    #[test]
    fn hung_render_holding_shared_lock_fails_later_pages_fast() {
        static LIBRARY: Mutex<()> = Mutex::new(());
        let gate = RenderGate::new();

        let first = gate.run(1, Some(Duration::from_millis(200)), || {
            let _held = LIBRARY.lock().unwrap_or_else(|e| e.into_inner());
            std::thread::sleep(Duration::from_secs(3));
            blank()
        });
        assert!(matches!(first, Err(PageFailure::RenderTimeout { page: 1, .. })));

        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_render = Arc::clone(&ran);
        let started = Instant::now();
        let second = gate.run(2, Some(Duration::from_millis(200)), move || {
            ran_in_render.store(true, Ordering::SeqCst);
            let _held = LIBRARY.lock().unwrap_or_else(|e| e.into_inner());
            blank()
        });

        match second {
            Err(PageFailure::RenderError { page: 2, detail }) => {
                assert!(detail.contains("disabled"), "got: {detail}");
            }
            other => panic!("expected fast RenderError, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_millis(150));
        assert!(!ran.load(Ordering::SeqCst), "no thread should queue on the lock");
    }

    #[test]
    fn deadline_excludes_time_waiting_for_the_gate() {
        let gate = Arc::new(RenderGate::new());
        let handles: Vec<_> = (1..=3u32)
            .map(|page| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || {
                    gate.run(page, Some(Duration::from_millis(400)), || {
                        std::thread::sleep(Duration::from_millis(150));
                        blank()
                    })
                })
            })
            .collect();

        // serialized: 450 ms in total, but each render is within its own deadline
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert!(!gate.is_poisoned());
    }
}
