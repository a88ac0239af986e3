// Job level: open source -> scheduled page processing -> atomic write ->
// quality guarantee, with planner-driven retries around it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use super::cancel::CancellationToken;
use super::page_processor::{MrcTransformer, OutputLayout};
use super::scheduler::{PageBatchScheduler, ProcessReport, SchedulerOptions};
use super::strategy::SizeCategory;
use crate::config::preset::{CompressionConfig, Preset};
use crate::config::settings::Settings;
use crate::document::raster::{ImageSink, ImageSource};
use crate::document::{AtomicWriter, DocumentSink, PageSource, StagedFileWriter};
use crate::error::{ResourceKind, SqueezeError};
use crate::memory::{MeminfoMonitor, MemoryPressureMonitor};
use crate::mrc::filters::ProcessingContext;
use crate::mrc::separator::LayerSeparator;
use crate::pdf::reader::PdfSource;
use crate::pdf::writer::PdfSink;
use crate::quality::{Artifact, GuaranteeResult, QualityGuarantee};
use crate::recovery::{RecoveryAction, RecoveryContext, RecoveryPlanner};

/// Configuration for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub preset: Preset,
    pub compression: CompressionConfig,
}

/// Result of a job that produced a verified outcome.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Preset of the attempt that succeeded (may be degraded).
    pub preset: Preset,
    pub attempts: u32,
    pub pages_processed: usize,
    pub substituted_pages: Vec<usize>,
    pub guarantee: GuaranteeResult,
}

/// A job that ended without an outcome, with the planner's advice.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct JobFailure {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[source]
    pub error: SqueezeError,
    pub action: RecoveryAction,
    pub attempts: u32,
}

/// One `compress` call.
#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub preset: Preset,
    pub config: CompressionConfig,
    /// Set by a chunked retry; caps the batch size and lifts the input
    /// size limit.
    pub chunk_size: Option<usize>,
}

impl CompressRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, preset: Preset) -> Self {
        Self {
            input_path: input.into(),
            output_path: output.into(),
            preset,
            config: preset.config(),
            chunk_size: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressOutcome {
    pub guarantee: GuaranteeResult,
    pub report: ProcessReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentAnalysis {
    pub page_count: usize,
    pub size_category: SizeCategory,
    #[serde(serialize_with = "serialize_secs")]
    pub estimated_time: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// An opened input document.
enum Input {
    Pdf(PdfSource),
    Raster(ImageSource),
}

impl Input {
    fn from_bytes(path: &Path, bytes: Vec<u8>, assumed_dpi: u32) -> crate::error::Result<Self> {
        if bytes.starts_with(b"%PDF-") {
            Ok(Input::Pdf(PdfSource::from_bytes(path, &bytes)?))
        } else {
            Ok(Input::Raster(ImageSource::from_bytes(path, bytes, assumed_dpi)?))
        }
    }

    fn page_count(&self) -> crate::error::Result<usize> {
        match self {
            Input::Pdf(source) => source.page_count(),
            Input::Raster(source) => source.page_count(),
        }
    }
}

pub struct JobRunner {
    settings: Settings,
    monitor: Arc<dyn MemoryPressureMonitor>,
    context: Arc<ProcessingContext>,
    writer: Arc<dyn AtomicWriter>,
    cancel: CancellationToken,
}

impl JobRunner {
    /// System memory monitor, staged file writer, fresh filter cache.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            monitor: Arc::new(MeminfoMonitor),
            context: Arc::new(ProcessingContext::new()),
            writer: Arc::new(StagedFileWriter),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MemoryPressureMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn AtomicWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn analyze(&self, input: &Path) -> crate::error::Result<DocumentAnalysis> {
        let bytes = std::fs::read(input).map_err(|e| SqueezeError::from_open_error(input, e))?;
        let page_count =
            Input::from_bytes(input, bytes, self.settings.assumed_image_dpi)?.page_count()?;
        let size_category = SizeCategory::from_page_count(page_count);
        Ok(DocumentAnalysis {
            page_count,
            size_category,
            estimated_time: size_category.strategy().estimated_time(page_count),
        })
    }

    pub fn compress(&self, request: &CompressRequest) -> crate::error::Result<GuaranteeResult> {
        self.compress_with_progress(request, &mut |_, _, _| {})
            .map(|outcome| outcome.guarantee)
    }

    /// Compress `request.input_path` into `request.output_path`.
    ///
    /// The destination is written only after every page was processed; a
    /// cancelled or failed run leaves it untouched.
    pub fn compress_with_progress(
        &self,
        request: &CompressRequest,
        progress: &mut dyn FnMut(usize, usize, &str),
    ) -> crate::error::Result<CompressOutcome> {
        let input = request.input_path.as_path();
        let output = request.output_path.as_path();
        if same_file(input, output) {
            return Err(SqueezeError::invalid_input(format!(
                "output {} would overwrite the input",
                output.display()
            )));
        }
        self.cancel.check()?;

        let size = std::fs::metadata(input)
            .map_err(|e| SqueezeError::from_open_error(input, e))?
            .len();
        if let Some(limit) = self.settings.max_input_bytes
            && size > limit
            && request.chunk_size.is_none()
        {
            return Err(SqueezeError::ResourceExhausted(ResourceKind::FileTooLarge));
        }

        let bytes = std::fs::read(input).map_err(|e| SqueezeError::from_open_error(input, e))?;
        let original = Artifact::from_bytes(input, &bytes);
        let opened = Input::from_bytes(input, bytes, self.settings.assumed_image_dpi)?;

        let report = match &opened {
            Input::Pdf(source) => {
                let mut sink = PdfSink::for_source(source);
                let report = self.process(source, &mut sink, OutputLayout::Layered, request, progress)?;
                self.cancel.check()?;
                sink.write(output, self.writer.as_ref())?;
                report
            }
            Input::Raster(source) => {
                let mut sink = ImageSink::for_source(source);
                let report =
                    self.process(source, &mut sink, OutputLayout::Flattened, request, progress)?;
                self.cancel.check()?;
                sink.write(output, self.writer.as_ref())?;
                report
            }
        };
        drop(opened);

        let candidate = Artifact::open(output)?;
        let guarantee = QualityGuarantee::new().verify(&original, &candidate, request.preset);
        info!(
            input = %input.display(),
            outcome = guarantee.outcome(),
            original = original.size,
            candidate = candidate.size,
            "compression finished"
        );
        Ok(CompressOutcome { guarantee, report })
    }

    fn process(
        &self,
        source: &dyn PageSource,
        sink: &mut dyn DocumentSink,
        layout: OutputLayout,
        request: &CompressRequest,
        progress: &mut dyn FnMut(usize, usize, &str),
    ) -> crate::error::Result<ProcessReport> {
        let separator = LayerSeparator::new(self.context.clone(), self.settings.separator.clone());
        let transformer = Arc::new(MrcTransformer::new(separator, layout));
        let options = SchedulerOptions {
            parallel_workers: self.settings.parallel_workers,
            batch_size_override: request.chunk_size,
            backpressure_pause: self.settings.memory.backpressure_pause(),
            relief_timeout: self.settings.memory.relief_timeout(),
            deadline: self.settings.processing_timeout(),
        };
        PageBatchScheduler::new(transformer, self.monitor.clone(), self.cancel.clone(), options)
            .process(source, sink, &request.config, progress)
    }

    /// Run `job`, consulting the recovery planner after each failure and
    /// retrying with a degraded preset or in chunks while it says so.
    pub fn run_job(&self, job: &JobConfig) -> Result<JobResult, JobFailure> {
        let span = info_span!("job", input = %job.input_path.display());
        let _enter = span.enter();

        let planner = RecoveryPlanner::new(self.settings.max_retries);
        let mut request = CompressRequest {
            input_path: job.input_path.clone(),
            output_path: job.output_path.clone(),
            preset: job.preset,
            config: job.compression,
            chunk_size: None,
        };
        let mut retry_count = 0;

        loop {
            let mut progress = |done: usize, total: usize, status: &str| {
                debug!(done, total, status, "progress");
            };
            let error = match self.compress_with_progress(&request, &mut progress) {
                Ok(outcome) => {
                    return Ok(JobResult {
                        input_path: job.input_path.clone(),
                        output_path: job.output_path.clone(),
                        preset: request.preset,
                        attempts: retry_count + 1,
                        pages_processed: outcome.report.pages_total,
                        substituted_pages: outcome.report.substituted_pages,
                        guarantee: outcome.guarantee,
                    });
                }
                Err(e) => e,
            };

            let context = RecoveryContext {
                preset: request.preset,
                file_size: std::fs::metadata(&job.input_path)
                    .map(|m| m.len())
                    .unwrap_or(0),
                page_count: self
                    .analyze(&job.input_path)
                    .map(|a| a.page_count)
                    .unwrap_or(0),
                is_premium_entitled: self.settings.premium,
                retry_count,
            };
            let action = planner.plan(&error, &context);
            match action {
                RecoveryAction::RetryDegraded { preset } => {
                    warn!(error = %error, from = %request.preset, to = %preset, "retrying with degraded preset");
                    request.config = degrade(&request.config, preset);
                    request.preset = preset;
                }
                RecoveryAction::RetryChunked { chunk_size } => {
                    warn!(error = %error, chunk_size, "retrying in chunks");
                    request.chunk_size = Some(chunk_size);
                }
                _ => {
                    return Err(JobFailure {
                        input_path: job.input_path.clone(),
                        output_path: job.output_path.clone(),
                        error,
                        action,
                        attempts: retry_count + 1,
                    });
                }
            }
            retry_count += 1;
        }
    }
}

/// Table row of `preset`, keeping the caller's layer-separation choice.
fn degrade(current: &CompressionConfig, preset: Preset) -> CompressionConfig {
    let mut next = preset.config();
    next.use_layer_separation = current.use_layer_separation;
    next
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
