//! Decomposition entry points.
//!
//! One invocation takes one source PDF and writes `1 + N` objects: a raster of
//! the designated page and a single-page PDF for each of the `N` pages. All
//! outputs are attempted even when some fail; the invocation succeeds only if
//! every one of them was written. Nothing is rolled back, so a failed
//! invocation may leave some outputs behind; re-running it overwrites them
//! with identical bytes.
//!
//! Three layers, outermost first:
//!
//! * [`handle_invocation`]: boundary: raw event in, `{statusCode, message}`
//!   out, diagnostics to `tracing`.
//! * [`Decomposer::convert`]: fetch the source from the store, derive output
//!   names from its key, then run.
//! * [`Decomposer::run`]: the pipeline itself, on bytes already in memory.

use crate::config::{ConversionParams, InvocationEvent, SplitConfig};
use crate::error::{OutputError, PageSplitError};
use crate::output::{
    InvocationResponse, InvocationResult, InvocationState, InvocationStats, OperationOutcome,
    OutputKind,
};
use crate::pipeline::geometry::{resolve_with_fit, TargetGeometry};
use crate::pipeline::naming::{SourceKey, StorageKey};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::source::SourceDocument;
use crate::pipeline::{extract, raster};
use crate::progress::ProgressCallback;
use crate::storage::{ObjectSink, ObjectStore, PDF_CONTENT_TYPE};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A validated request: where the source lives and what to produce.
#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub bucket: String,
    pub source: SourceKey,
    pub params: ConversionParams,
}

impl SplitRequest {
    /// Validate a raw event: decode the key and apply parameter defaults.
    pub fn from_event(event: &InvocationEvent) -> Result<Self, PageSplitError> {
        if event.bucket.trim().is_empty() {
            return Err(PageSplitError::InvalidParams("bucket is required".into()));
        }
        Ok(Self {
            bucket: event.bucket.clone(),
            source: SourceKey::parse(&event.pdfkey)?,
            params: ConversionParams::from_event(event)?,
        })
    }
}

/// One unit of work inside an invocation.
#[derive(Debug, Clone, Copy)]
enum Job {
    Raster(usize),
    Extract(usize),
}

/// Runs invocations against one store with one renderer.
///
/// Cheap to share: hold it in an `Arc` and call [`Decomposer::convert`] from
/// as many tasks as needed. No state is kept between invocations.
pub struct Decomposer {
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn PageRenderer>,
    config: SplitConfig,
}

impl Decomposer {
    pub fn new(store: Arc<dyn ObjectStore>, renderer: Arc<dyn PageRenderer>, config: SplitConfig) -> Self {
        Self {
            store,
            renderer,
            config,
        }
    }

    /// Use the pdfium renderer configured from `config`.
    pub fn with_pdfium(store: Arc<dyn ObjectStore>, config: SplitConfig) -> Self {
        let renderer = Arc::new(PdfiumRenderer::from_config(&config));
        Self::new(store, renderer, config)
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Fetch the source object, then [`run`](Self::run) with names derived
    /// from its key.
    pub async fn convert(&self, request: &SplitRequest) -> InvocationResult {
        let started = Instant::now();
        info!("Starting split: {}/{}", request.bucket, request.source.key);

        let bytes = match self.store.get(&request.bucket, &request.source.key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return failed_before_processing(
                    PageSplitError::SourceFetchFailed {
                        bucket: request.bucket.clone(),
                        key: request.source.key.clone(),
                        detail: e.to_string(),
                    },
                    started,
                    0,
                );
            }
        };
        debug!("Fetched {} bytes", bytes.len());

        self.run(
            &request.bucket,
            bytes,
            &request.params,
            &request.source.dir,
            &request.source.base,
        )
        .await
    }

    /// Split `source_bytes` and write every output to `bucket`.
    ///
    /// Outputs go to `{dir}/{raster_page}.{ext}` and `{dir}/{base_name}-{n}.pdf`.
    /// Always returns a result in a terminal state; see
    /// [`InvocationResult::into_result`] for `?`-style handling.
    pub async fn run(
        &self,
        bucket: &str,
        source_bytes: Vec<u8>,
        params: &ConversionParams,
        dir: &str,
        base_name: &str,
    ) -> InvocationResult {
        let started = Instant::now();
        let mut state = InvocationState::Pending;

        // ── Load ─────────────────────────────────────────────────────────────
        advance(&mut state, InvocationState::Loading);
        let load_started = Instant::now();
        let loaded = tokio::task::spawn_blocking(move || SourceDocument::load(source_bytes))
            .await
            .map_err(|e| PageSplitError::Internal(format!("Load task panicked: {e}")))
            .and_then(|r| r);
        let load_duration_ms = load_started.elapsed().as_millis() as u64;

        let source = match loaded {
            Ok(doc) => Arc::new(doc),
            Err(e) => {
                warn!("Source rejected: {}", e);
                return failed_before_processing(e, started, load_duration_ms);
            }
        };

        // ── Fan out ──────────────────────────────────────────────────────────
        advance(&mut state, InvocationState::Processing);
        let page_count = source.page_count();
        let jobs = plan_jobs(page_count, self.config.raster_page);
        let total = jobs.len();
        info!(
            "Splitting {} pages into {} outputs (concurrency {})",
            page_count, total, self.config.concurrency
        );
        if let Some(cb) = &self.config.progress_callback {
            cb.on_split_start(page_count, total);
        }

        let ctx = Arc::new(TaskContext {
            source,
            renderer: Arc::clone(&self.renderer),
            sink: ObjectSink::new(Arc::clone(&self.store), bucket),
            geometry: resolve_with_fit(params.width(), params.height(), self.config.fit),
            params: *params,
            dir: dir.to_string(),
            base_name: base_name.to_string(),
            progress: self.config.progress_callback.clone(),
        });

        let (mut outcomes, timed_out) = self.drive(jobs, ctx).await;
        outcomes.sort_by_key(|o| (o.kind, o.page_index));

        // ── Aggregate ────────────────────────────────────────────────────────
        let written = outcomes.iter().filter(|o| o.is_ok()).count();
        let failed = outcomes.len() - written;
        let stats = InvocationStats {
            page_count,
            total_outputs: total,
            written_outputs: written,
            failed_outputs: failed,
            bytes_written: outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().ok())
                .map(|&n| n as u64)
                .sum(),
            load_duration_ms,
            total_duration_ms: started.elapsed().as_millis() as u64,
        };

        let terminal = if let Some(secs) = timed_out {
            InvocationState::Failed(PageSplitError::TimedOut { secs })
        } else if let Some(first) = outcomes.iter().find_map(OperationOutcome::error) {
            InvocationState::Failed(PageSplitError::PartialFailure {
                failed,
                total,
                first_error: first.to_string(),
            })
        } else {
            InvocationState::Succeeded
        };
        advance(&mut state, terminal);

        if let Some(cb) = &self.config.progress_callback {
            cb.on_split_complete(total, written);
        }
        info!(
            "Split {}: {}/{} outputs written, {} bytes, {}ms",
            state.name(),
            written,
            total,
            stats.bytes_written,
            stats.total_duration_ms
        );

        InvocationResult {
            state,
            outcomes,
            stats,
        }
    }

    /// Run every job with bounded concurrency, stopping at the deadline.
    ///
    /// Returns the outcomes that finished and, if the deadline passed, the
    /// configured timeout.
    async fn drive(&self, jobs: Vec<Job>, ctx: Arc<TaskContext>) -> (Vec<OperationOutcome>, Option<u64>) {
        let total = jobs.len();
        let mut pending = stream::iter(jobs.into_iter().map(|job| run_job(job, Arc::clone(&ctx))))
            .buffer_unordered(self.config.concurrency.max(1));

        let deadline = self
            .config
            .timeout_secs
            .map(|secs| (secs, tokio::time::Instant::now() + Duration::from_secs(secs)));

        let mut outcomes = Vec::with_capacity(total);
        loop {
            let next = match deadline {
                Some((secs, at)) => match tokio::time::timeout_at(at, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            "Deadline of {}s passed with {} of {} outputs unfinished",
                            secs,
                            total - outcomes.len(),
                            total
                        );
                        return (outcomes, Some(secs));
                    }
                },
                None => pending.next().await,
            };
            match next {
                Some(outcome) => outcomes.push(outcome),
                None => return (outcomes, None),
            }
        }
    }
}

/// Raster first, then one extract per page.
fn plan_jobs(page_count: usize, raster_page: usize) -> Vec<Job> {
    if page_count == 0 {
        return Vec::new();
    }
    std::iter::once(Job::Raster(raster_page))
        .chain((0..page_count).map(Job::Extract))
        .collect()
}

/// Read-only state shared by every job of one invocation.
struct TaskContext {
    source: Arc<SourceDocument>,
    renderer: Arc<dyn PageRenderer>,
    sink: ObjectSink,
    geometry: TargetGeometry,
    params: ConversionParams,
    dir: String,
    base_name: String,
    progress: Option<ProgressCallback>,
}

fn run_job(job: Job, ctx: Arc<TaskContext>) -> BoxFuture<'static, OperationOutcome> {
    Box::pin(async move {
        let (kind, page_index, key) = match job {
            Job::Raster(i) => (
                OutputKind::Raster,
                i,
                StorageKey::raster(&ctx.dir, i, ctx.params.format()),
            ),
            Job::Extract(i) => (
                OutputKind::Extract,
                i,
                StorageKey::extract(&ctx.dir, &ctx.base_name, i),
            ),
        };

        let result = match kind {
            OutputKind::Raster => write_raster(&ctx, page_index, &key).await,
            OutputKind::Extract => write_extract(&ctx, page_index, &key).await,
        };

        match &result {
            Ok(bytes) => {
                debug!("Wrote {} ({} bytes)", key, bytes);
                if let Some(cb) = &ctx.progress {
                    cb.on_output_complete(key.as_str(), *bytes);
                }
            }
            Err(e) => {
                warn!("Output {} failed: {}", key, e);
                if let Some(cb) = &ctx.progress {
                    cb.on_output_error(key.as_str(), &e.to_string());
                }
            }
        }

        OperationOutcome {
            kind,
            page_index,
            key: key.to_string(),
            result,
        }
    })
}

async fn write_raster(ctx: &TaskContext, page_index: usize, key: &StorageKey) -> Result<usize, OutputError> {
    let image = raster::rasterize(
        Arc::clone(&ctx.renderer),
        Arc::clone(&ctx.source),
        page_index,
        ctx.geometry,
        ctx.params.format(),
    )
    .await?;
    let content_type = image.content_type();
    ctx.sink.put(key, image.bytes, content_type).await
}

async fn write_extract(ctx: &TaskContext, page_index: usize, key: &StorageKey) -> Result<usize, OutputError> {
    let source = Arc::clone(&ctx.source);
    let extracted = tokio::task::spawn_blocking(move || extract::extract_page(&source, page_index))
        .await
        .map_err(|e| OutputError::ExtractionFailed {
            page: page_index,
            detail: format!("extract task panicked: {e}"),
        })??;
    ctx.sink.put(key, extracted.bytes, PDF_CONTENT_TYPE).await
}

fn advance(state: &mut InvocationState, next: InvocationState) {
    debug!("Invocation state {} → {}", state.name(), next.name());
    *state = next;
}

fn failed_before_processing(cause: PageSplitError, started: Instant, load_duration_ms: u64) -> InvocationResult {
    InvocationResult {
        state: InvocationState::Failed(cause),
        outcomes: Vec::new(),
        stats: InvocationStats {
            load_duration_ms,
            total_duration_ms: started.elapsed().as_millis() as u64,
            ..InvocationStats::default()
        },
    }
}

/// Handle one invocation end to end and collapse the result into the wire
/// response.
///
/// Never fails: bad events, missing sources and output failures all become
/// `{statusCode: 400, message: "Failed"}`, with the cause logged at error
/// level.
pub async fn handle_invocation(
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn PageRenderer>,
    config: SplitConfig,
    event: &InvocationEvent,
) -> InvocationResponse {
    let request = match SplitRequest::from_event(event) {
        Ok(request) => request,
        Err(e) => {
            error!("Rejected invocation for '{}': {}", event.pdfkey, e);
            return InvocationResponse::failure();
        }
    };

    let result = Decomposer::new(store, renderer, config).convert(&request).await;
    if let InvocationState::Failed(cause) = &result.state {
        error!(
            "Split of {}/{} failed: {}",
            request.bucket, request.source.key, cause
        );
        for outcome in result.outcomes.iter().filter(|o| !o.is_ok()) {
            if let Some(e) = outcome.error() {
                error!("  {}: {}", outcome.key, e);
            }
        }
    }
    InvocationResponse::from(&result)
}

/// Like [`handle_invocation`], for a payload that has not been deserialised
/// yet. A payload that is not a valid event is a failed invocation.
pub async fn handle_event_value(
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn PageRenderer>,
    config: SplitConfig,
    payload: serde_json::Value,
) -> InvocationResponse {
    match serde_json::from_value::<InvocationEvent>(payload) {
        Ok(event) => handle_invocation(store, renderer, config, &event).await,
        Err(e) => {
            error!("Malformed invocation payload: {}", e);
            InvocationResponse::failure()
        }
    }
}
