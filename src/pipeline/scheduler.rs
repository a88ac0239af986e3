// Memory-bounded page batches: read -> transform -> append, with a
// memory-pressure checkpoint between batches.

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::page_processor::PageTransformer;
use super::strategy::{ProcessingStrategy, SizeCategory};
use crate::config::preset::CompressionConfig;
use crate::document::{AccessScope, DocumentSink, PageSource};
use crate::error::{ResourceKind, SqueezeError};
use crate::memory::{MemoryPressureLevel, MemoryPressureMonitor};
use crate::mrc::{Page, PageOutput};

/// Longest edge of generated thumbnails, in pixels.
pub const THUMBNAIL_SIZE: u32 = 128;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// 0 = rayon default pool, 1 = sequential, n = dedicated pool of n.
    pub parallel_workers: usize,
    /// Upper bound on the strategy's batch size (chunked retries).
    pub batch_size_override: Option<usize>,
    /// Sleep after a batch that ended under `Warning` pressure.
    pub backpressure_pause: Duration,
    /// Longest wait for relief under `Critical`/`Terminal` pressure.
    pub relief_timeout: Duration,
    /// Abort with a timeout once a run exceeds this.
    pub deadline: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            parallel_workers: 0,
            batch_size_override: None,
            backpressure_pause: Duration::from_millis(250),
            relief_timeout: Duration::from_secs(30),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub page_index: usize,
    pub image: DynamicImage,
}

#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub pages_total: usize,
    pub size_category: SizeCategory,
    pub strategy: ProcessingStrategy,
    pub batch_size: usize,
    pub batches: usize,
    /// Pages kept unmodified because their transform failed.
    pub substituted_pages: Vec<usize>,
    pub thumbnails: Vec<Thumbnail>,
}

struct BatchItem {
    output: PageOutput,
    thumbnail: Option<Thumbnail>,
}

pub struct PageBatchScheduler {
    transformer: Arc<dyn PageTransformer>,
    monitor: Arc<dyn MemoryPressureMonitor>,
    cancel: CancellationToken,
    options: SchedulerOptions,
}

impl PageBatchScheduler {
    pub fn new(
        transformer: Arc<dyn PageTransformer>,
        monitor: Arc<dyn MemoryPressureMonitor>,
        cancel: CancellationToken,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            transformer,
            monitor,
            cancel,
            options,
        }
    }

    /// Process every page of `source` into `sink`.
    ///
    /// `progress` receives `(pages_done, pages_total, status)` after each
    /// page is appended. A failing page transform substitutes the original
    /// page; read failures other than unsupported page content abort.
    pub fn process(
        &self,
        source: &dyn PageSource,
        sink: &mut dyn DocumentSink,
        config: &CompressionConfig,
        progress: &mut dyn FnMut(usize, usize, &str),
    ) -> crate::error::Result<ProcessReport> {
        let _access = AccessScope::begin(source)?;
        let total = source.page_count()?;
        if total == 0 {
            return Err(SqueezeError::invalid_input("document has no pages"));
        }

        let size_category = SizeCategory::from_page_count(total);
        let strategy = size_category.strategy();
        let mut batch_size = strategy.batch_size(total);
        if let Some(cap) = self.options.batch_size_override {
            batch_size = batch_size.min(cap);
        }
        let batch_size = batch_size.max(1);
        let thumbnail_limit = size_category.thumbnail_limit().unwrap_or(total);

        info!(
            pages = total,
            ?size_category,
            ?strategy,
            batch_size,
            "processing document"
        );

        if !self.monitor.can_start_intensive_operation() {
            self.wait_or_fail()?;
        }

        let pool = self.build_pool()?;
        let started = Instant::now();
        let mut report = ProcessReport {
            pages_total: total,
            size_category,
            strategy,
            batch_size,
            batches: 0,
            substituted_pages: Vec::new(),
            thumbnails: Vec::new(),
        };
        let mut done = 0;

        for start in (0..total).step_by(batch_size) {
            let end = (start + batch_size).min(total);
            let pages = self.read_batch(source, start..end)?;
            let items = match &pool {
                Some(pool) => pool.install(|| self.transform_batch(pages, config, thumbnail_limit)),
                None => self.transform_batch(pages, config, thumbnail_limit),
            }?;

            for item in items {
                let index = item.output.index();
                let status = match &item.output {
                    PageOutput::Encoded(_) => format!("page {} compressed", index + 1),
                    PageOutput::Original(_) => {
                        report.substituted_pages.push(index);
                        format!("page {} kept original", index + 1)
                    }
                };
                sink.append_page(item.output)?;
                report.thumbnails.extend(item.thumbnail);
                done += 1;
                progress(done, total, &status);
            }
            report.batches += 1;
            debug!(batch = report.batches, pages_done = done, "batch complete");

            if let Some(limit) = self.options.deadline
                && started.elapsed() > limit
            {
                warn!(elapsed = ?started.elapsed(), ?limit, "processing deadline exceeded");
                return Err(SqueezeError::ResourceExhausted(ResourceKind::Timeout));
            }
            if end < total {
                self.relieve_memory_pressure()?;
            }
        }

        info!(
            pages = total,
            batches = report.batches,
            substituted = report.substituted_pages.len(),
            "document processed"
        );
        Ok(report)
    }

    fn build_pool(&self) -> crate::error::Result<Option<rayon::ThreadPool>> {
        match self.options.parallel_workers {
            0 | 1 => Ok(None),
            n => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map(Some)
                .map_err(|e| SqueezeError::config(format!("cannot build worker pool: {e}"))),
        }
    }

    /// Decode the batch's pages in order. Pages whose content cannot be
    /// rasterised become `Err(index)` and are kept as originals.
    fn read_batch(
        &self,
        source: &dyn PageSource,
        range: Range<usize>,
    ) -> crate::error::Result<Vec<Result<Page, usize>>> {
        let mut pages = Vec::with_capacity(range.len());
        for index in range {
            self.cancel.check()?;
            match source.page(index) {
                Ok(page) => pages.push(Ok(page)),
                Err(SqueezeError::InvalidInput(reason)) | Err(SqueezeError::PdfReadError(reason)) => {
                    warn!(page = index, %reason, "page unreadable, keeping original");
                    pages.push(Err(index));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(pages)
    }

    /// Transform a batch, in parallel unless configured sequential. Output
    /// order follows input order.
    fn transform_batch(
        &self,
        pages: Vec<Result<Page, usize>>,
        config: &CompressionConfig,
        thumbnail_limit: usize,
    ) -> crate::error::Result<Vec<BatchItem>> {
        let run = |slot: Result<Page, usize>| -> crate::error::Result<BatchItem> {
            match slot {
                Ok(page) => self.transform_page(page, config, thumbnail_limit),
                Err(index) => Ok(BatchItem {
                    output: PageOutput::Original(index),
                    thumbnail: None,
                }),
            }
        };

        if self.options.parallel_workers == 1 || pages.len() == 1 {
            pages.into_iter().map(run).collect()
        } else {
            pages.into_par_iter().map(run).collect()
        }
    }

    fn transform_page(
        &self,
        page: Page,
        config: &CompressionConfig,
        thumbnail_limit: usize,
    ) -> crate::error::Result<BatchItem> {
        self.cancel.check()?;
        let index = page.index;
        let thumbnail = (index < thumbnail_limit).then(|| Thumbnail {
            page_index: index,
            image: page.image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE),
        });

        let output = match self.transformer.transform(&page, config) {
            Ok(encoded) => PageOutput::Encoded(encoded),
            Err(SqueezeError::Cancelled) => return Err(SqueezeError::Cancelled),
            Err(e) => {
                warn!(page = index, error = %e, "page transform failed, keeping original");
                PageOutput::Original(index)
            }
        };
        // Release the decoded raster before the next page is taken up.
        drop(page);

        Ok(BatchItem { output, thumbnail })
    }

    /// Cooperative backpressure between batches.
    fn relieve_memory_pressure(&self) -> crate::error::Result<()> {
        match self.monitor.current_level() {
            MemoryPressureLevel::Normal => Ok(()),
            MemoryPressureLevel::Warning => {
                debug!(pause = ?self.options.backpressure_pause, "memory warning, pausing");
                std::thread::sleep(self.options.backpressure_pause);
                Ok(())
            }
            MemoryPressureLevel::Critical | MemoryPressureLevel::Terminal => self.wait_or_fail(),
        }
    }

    fn wait_or_fail(&self) -> crate::error::Result<()> {
        self.cancel.check()?;
        warn!(timeout = ?self.options.relief_timeout, "memory pressure high, waiting for relief");
        if self.monitor.wait_for_relief(self.options.relief_timeout) {
            Ok(())
        } else {
            Err(SqueezeError::ResourceExhausted(ResourceKind::Memory))
        }
    }
}
