// 順序復元: 完了順に届く結果をページ番号順に並べ直し、欠落ページを記録する

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::{OrderedPage, PageArtifact, PageResult};
use crate::config::job::PageRange;
use crate::error::PageFailure;

/// Totals for one collected range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub requested: usize,
    pub succeeded: usize,
    /// Failed or never-observed pages, keyed by page index.
    pub failures: BTreeMap<u32, PageFailure>,
}

impl CollectSummary {
    /// Ascending indices of pages absent from the output.
    pub fn skipped_pages(&self) -> Vec<u32> {
        self.failures.keys().copied().collect()
    }
}

/// Successful pages in ascending order, plus the gaps.
#[derive(Debug)]
pub struct OrderedBatch {
    pub pages: Vec<OrderedPage>,
    pub summary: CollectSummary,
}

/// Reorders an unordered result stream for one page range.
///
/// Successful pages are released as soon as every lower index in the range
/// has been observed, so a downstream consumer can stream while workers are
/// still running.
#[derive(Debug)]
pub struct OrderedCollector {
    range: PageRange,
    /// Next index to release. `u64` so `end == u32::MAX` cannot overflow.
    next: u64,
    seen: BTreeSet<u32>,
    pending: BTreeMap<u32, PageArtifact>,
    summary: CollectSummary,
}

impl OrderedCollector {
    pub fn new(range: PageRange) -> Self {
        Self {
            range,
            next: range.start as u64,
            seen: BTreeSet::new(),
            pending: BTreeMap::new(),
            summary: CollectSummary {
                requested: range.len(),
                ..CollectSummary::default()
            },
        }
    }

    /// Record one result and return the pages that became releasable.
    ///
    /// Out-of-range and duplicate results are dropped with a warning.
    pub fn push(&mut self, result: PageResult) -> Vec<OrderedPage> {
        let page = result.page_index;
        if !self.range.contains(page) {
            warn!(page, range = %self.range, "ignoring result outside the requested range");
            return Vec::new();
        }
        if !self.seen.insert(page) {
            warn!(page, "ignoring duplicate result");
            return Vec::new();
        }

        match result.outcome {
            Ok(artifact) => {
                self.pending.insert(page, artifact);
            }
            Err(failure) => {
                self.summary.failures.insert(page, failure);
            }
        }
        self.release()
    }

    fn release(&mut self) -> Vec<OrderedPage> {
        let mut ready = Vec::new();
        while self.next <= self.range.end as u64 {
            let page = self.next as u32;
            if let Some(artifact) = self.pending.remove(&page) {
                self.summary.succeeded += 1;
                ready.push(OrderedPage {
                    page_index: page,
                    artifact,
                });
            } else if !self.summary.failures.contains_key(&page) {
                break;
            }
            self.next += 1;
        }
        ready
    }

    /// Close the range: unobserved pages become [`PageFailure::Missing`] and
    /// everything still buffered is released.
    pub fn finish(mut self) -> (Vec<OrderedPage>, CollectSummary) {
        for page in self.range.iter() {
            if !self.seen.contains(&page) {
                warn!(page, "no result received");
                self.summary
                    .failures
                    .insert(page, PageFailure::Missing { page });
            }
        }
        let rest = self.release();
        (rest, self.summary)
    }
}

/// Fully buffered form: consume `results` and return the ordered batch.
pub fn collect_ordered<I>(results: I, range: PageRange) -> OrderedBatch
where
    I: IntoIterator<Item = PageResult>,
{
    let mut collector = OrderedCollector::new(range);
    let mut pages = Vec::new();
    for result in results {
        pages.extend(collector.push(result));
    }
    let (rest, summary) = collector.finish();
    pages.extend(rest);
    OrderedBatch { pages, summary }
}
