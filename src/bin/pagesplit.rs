//! CLI binary for pdf-pagesplit.
//!
//! A thin shim over the library crate that maps CLI flags (or an event file)
//! to an invocation, runs it, and prints the invocation response.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_pagesplit::{
    Decomposer, FitMode, InvocationEvent, InvocationResponse, InvocationState, LocalObjectStore,
    ObjectStore, PdfiumRenderer, ProgressCallback, S3ObjectStore, SplitConfig,
    SplitProgressCallback, SplitRequest,
};
use serde_json::{json, Value};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for all outputs plus a log line per
/// output. Outputs complete out of order, so lines are printed as they land.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Fetching PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl SplitProgressCallback for CliProgressCallback {
    fn on_split_start(&self, page_count: usize, total_outputs: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} outputs  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_outputs as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Splitting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{page_count} pages → {total_outputs} outputs"))
        ));
    }

    fn on_output_complete(&self, key: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} {:<48} {}",
            green("✓"),
            key,
            dim(&format!("{bytes:>9} bytes"))
        ));
        self.bar.inc(1);
    }

    fn on_output_error(&self, key: &str, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<48} {}", red("✗"), key, red(&msg)));
        self.bar.inc(1);
    }

    fn on_split_complete(&self, total_outputs: usize, success_count: usize) {
        let failed = total_outputs.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} outputs written",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} outputs written  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total_outputs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Split an S3 object (credentials from the usual AWS env/profile chain)
  pagesplit --bucket uploads --pdfkey docs/report.pdf

  # PNG thumbnail of 300x400
  pagesplit --bucket uploads --pdfkey docs/report.pdf --format png --width 300 --height 400

  # Replay a raw invocation event
  pagesplit --event event.json

  # Work against a local directory instead of S3 (bucket = subdirectory)
  pagesplit --local-root ./objects --bucket uploads --pdfkey "docs/my+report.pdf"

OUTPUTS (for pdfkey docs/report.pdf):
  docs/0.webp          raster of --raster-page (default 0)
  docs/report-1.pdf    one PDF per page, numbered from 1

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH      Path to libpdfium used for rasterisation
  AWS_REGION, AWS_PROFILE, AWS_ACCESS_KEY_ID, …   S3 client configuration
  RUST_LOG             Overrides the log filter
"#;

/// Split a PDF into per-page PDFs and a fixed-size page image.
#[derive(Parser, Debug)]
#[command(
    name = "pagesplit",
    version,
    about = "Split a stored PDF into single-page PDFs plus a fixed-size page raster",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Invocation event JSON file (`-` for stdin). Flags override its fields.
    #[arg(long, env = "PAGESPLIT_EVENT")]
    event: Option<PathBuf>,

    /// Bucket holding the source; outputs are written to the same bucket.
    #[arg(long, env = "PAGESPLIT_BUCKET")]
    bucket: Option<String>,

    /// Source object key, percent-encoded with `+` for spaces.
    #[arg(long, env = "PAGESPLIT_PDFKEY")]
    pdfkey: Option<String>,

    /// Raster format: webp, jpeg or png (exact, lowercase). Default: webp.
    #[arg(long, env = "PAGESPLIT_FORMAT")]
    format: Option<String>,

    /// Raster width in pixels, at most 16383. Default: 595.
    #[arg(long, env = "PAGESPLIT_WIDTH")]
    width: Option<u32>,

    /// Raster height in pixels, at most 16383. Default: 842.
    #[arg(long, env = "PAGESPLIT_HEIGHT")]
    height: Option<u32>,

    /// Use a local directory as the object store instead of S3.
    #[arg(long, env = "PAGESPLIT_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    /// Maximum outputs processed at once.
    #[arg(short, long, env = "PAGESPLIT_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Zero-based index of the page to rasterise.
    #[arg(long, env = "PAGESPLIT_RASTER_PAGE", default_value_t = 0)]
    raster_page: usize,

    /// How the page is fitted to the raster size: cover (crop) or contain (pad).
    #[arg(long, env = "PAGESPLIT_FIT", default_value = "cover")]
    fit: FitMode,

    /// Abandon the invocation after this many seconds.
    #[arg(long, env = "PAGESPLIT_TIMEOUT")]
    timeout: Option<u64>,

    /// Explicit path to the pdfium shared library.
    #[arg(long, env = "PAGESPLIT_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Print the full result (outcomes and stats) as JSON.
    #[arg(long, env = "PAGESPLIT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAGESPLIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGESPLIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGESPLIT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose mode always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build event + config ─────────────────────────────────────────────
    let event = build_event(&cli)?;

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|p| p as Arc<dyn SplitProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    let renderer = Arc::new(PdfiumRenderer::from_config(&config));
    if let Err(e) = renderer.check_library() {
        // Extraction still works; only the raster output will fail.
        warn!("{e}");
    }

    let store: Arc<dyn ObjectStore> = match &cli.local_root {
        Some(root) => Arc::new(LocalObjectStore::new(root)),
        None => Arc::new(S3ObjectStore::from_env().await),
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let request = match SplitRequest::from_event(&event) {
        Ok(request) => request,
        Err(e) => {
            clear_progress(cli_progress.as_deref());
            error!("Rejected invocation: {e}");
            let response = InvocationResponse::failure();
            print_response(&response, cli.json.then(|| json!({ "error": e.to_string() })))?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let result = Decomposer::new(store, renderer, config).convert(&request).await;
    let response = InvocationResponse::from(&result);
    // Fetch and load failures end before the callback's completion event.
    clear_progress(cli_progress.as_deref());

    if let InvocationState::Failed(cause) = &result.state {
        error!("Split failed: {cause}");
    }

    let details = cli.json.then(|| {
        let cause = match &result.state {
            InvocationState::Failed(e) => Value::String(e.to_string()),
            _ => Value::Null,
        };
        json!({
            "state": result.state.name(),
            "error": cause,
            "outcomes": result.outcomes,
            "stats": result.stats,
        })
    });
    print_response(&response, details)?;

    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "{}  {}/{} outputs  {} bytes  {}ms",
            if result.is_success() {
                green("✔")
            } else {
                red("✘")
            },
            result.stats.written_outputs,
            result.stats.total_outputs,
            result.stats.bytes_written,
            result.stats.total_duration_ms,
        );
    }

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn clear_progress(progress: Option<&CliProgressCallback>) {
    if let Some(p) = progress {
        if !p.bar.is_finished() {
            p.bar.finish_and_clear();
        }
    }
}

/// Start from `--event` (if any) and let explicit flags override its fields.
fn build_event(cli: &Cli) -> Result<InvocationEvent> {
    let mut event = match &cli.event {
        Some(path) => {
            let raw = if path.as_os_str() == "-" {
                let mut s = String::new();
                io::stdin()
                    .read_to_string(&mut s)
                    .context("Failed to read event from stdin")?;
                s
            } else {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read event file {}", path.display()))?
            };
            serde_json::from_str(&raw).context("Event is not a valid invocation payload")?
        }
        None => InvocationEvent::default(),
    };

    if let Some(bucket) = &cli.bucket {
        event.bucket = bucket.clone();
    }
    if let Some(key) = &cli.pdfkey {
        event.pdfkey = key.clone();
    }
    if let Some(format) = &cli.format {
        event.format = Some(format.clone());
    }
    if let Some(w) = cli.width {
        event.width = Some(Value::from(w));
    }
    if let Some(h) = cli.height {
        event.height = Some(Value::from(h));
    }

    if event.bucket.is_empty() || event.pdfkey.is_empty() {
        anyhow::bail!("Both a bucket and a pdfkey are required (flags or --event)");
    }
    Ok(event)
}

/// Map CLI args to `SplitConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SplitConfig> {
    let mut builder = SplitConfig::builder()
        .concurrency(cli.concurrency)
        .raster_page(cli.raster_page)
        .fit(cli.fit);

    if let Some(secs) = cli.timeout {
        builder = builder.timeout_secs(secs);
    }
    if let Some(path) = &cli.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_response(response: &InvocationResponse, details: Option<Value>) -> Result<()> {
    let out = match details {
        Some(mut details) => {
            details["response"] = serde_json::to_value(response)?;
            serde_json::to_string_pretty(&details)?
        }
        None => serde_json::to_string(response)?,
    };
    println!("{out}");
    Ok(())
}
