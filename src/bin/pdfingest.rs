//! CLI binary for edgequake-pdfingest.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! onto `IngestConfig` / `VisionConfig`, picks the engine and the store, and
//! reports results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use edgequake_pdfingest::{
    load_manifest, run_batch_with, DocumentPipeline, EngineKind, GcsStore, IngestConfig,
    IngestError, IngestProgressCallback, LocalStore, ObjectStore, PageConverter, ProgressCallback,
    SourceDocument, TextLayerConverter, VisionConfig, VisionConverter,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Per-page progress bar ────────────────────────────────────────────────────

/// Live page bar for a single document. Pages may finish out of order.
struct PageProgress {
    bar: ProgressBar,
    started: Mutex<HashMap<usize, Instant>>,
}

impl PageProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("splitting PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_number: usize) -> f64 {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&page_number)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl IngestProgressCallback for PageProgress {
    fn on_document_start(&self, doc_id: &str, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix(doc_id.to_string());
        self.bar.reset_eta();
    }

    fn on_page_start(&self, _doc_id: &str, page_number: usize) {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(page_number, Instant::now());
        self.bar.set_message(format!("page {page_number}"));
    }

    fn on_page_complete(&self, _doc_id: &str, page_number: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_number);
        self.bar.println(format!(
            "  {} Page {:>3}  {:<8}  {}",
            green("✓"),
            page_number,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, _doc_id: &str, page_number: usize, error: &str) {
        let secs = self.elapsed_secs(page_number);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            red("✗"),
            page_number,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, _doc_id: &str, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} pages converted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                if failed == total_pages { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # One document from a URL into the default bucket, first 5 pages only
  pdfingest parse https://example.org/informe.pdf --doc-id 1042 --testing

  # Local file, text layer only (no OCR), written under ./out/parsed/
  pdfingest parse informe.pdf --doc-id 1042 --engine text --store local --out-dir out

  # Every row of a spreadsheet manifest (columns: source, doc_id)
  pdfingest batch documents.xlsx --testing

ENVIRONMENT VARIABLES:
  DEFAULT_BUCKET          GCS bucket (default: cesgs-dart)
  GCS_ACCESS_TOKEN        OAuth2 bearer token for GCS uploads
  OCR_LANGUAGES           Comma-separated page languages (default: es)
  OCR_THREADS             Concurrent page conversions (default: 4)
  EDGEQUAKE_LLM_PROVIDER  Vision provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Vision model ID
  OPENAI_API_KEY          OpenAI API key (also ANTHROPIC_API_KEY, GEMINI_API_KEY)
  PDFIUM_LIB_PATH         Path to libpdfium for the vision engine
  PDFINGEST_*             Every other flag, e.g. PDFINGEST_STORE=local

A .env file in the working directory is loaded first.
"#;

/// Split PDFs into pages, convert each page to Markdown, persist the records.
#[derive(Parser, Debug)]
#[command(
    name = "pdfingest",
    version,
    about = "Split PDFs into pages, convert each page to Markdown, persist the page records",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one document.
    Parse {
        /// Local PDF path or HTTP/HTTPS URL.
        source: String,

        /// Document id; the artifact is stored at `{prefix}/{doc_id}.json`.
        #[arg(long)]
        doc_id: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Ingest every row of a manifest (.xlsx, .xls, .ods or .csv).
    Batch {
        /// Manifest with `source` and `doc_id` columns.
        manifest: PathBuf,

        /// Documents processed at the same time.
        #[arg(long, env = "PDFINGEST_BATCH_CONCURRENCY", default_value_t = 1)]
        docs: usize,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StoreArg {
    /// Google Cloud Storage bucket.
    Gs,
    /// Local directory mirror.
    Local,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EngineArg {
    /// OCR via a vision LLM.
    Vision,
    /// Embedded text layer, no OCR.
    Text,
}

impl From<EngineArg> for EngineKind {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Vision => EngineKind::Vision,
            EngineArg::Text => EngineKind::Text,
        }
    }
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Only the first 5 pages of each document.
    #[arg(long, env = "PDFINGEST_TESTING")]
    testing: bool,

    /// Maximum pages per document (overrides --testing).
    #[arg(long, env = "PDFINGEST_PAGE_LIMIT")]
    page_limit: Option<usize>,

    /// Conversion engine.
    #[arg(long, env = "PDFINGEST_ENGINE", value_enum, default_value = "vision")]
    engine: EngineArg,

    /// Concurrent page conversions per document.
    #[arg(long, env = "OCR_THREADS", default_value_t = 4)]
    threads: usize,

    /// Expected page languages, comma-separated.
    #[arg(long, env = "OCR_LANGUAGES", value_delimiter = ',', default_value = "es")]
    languages: Vec<String>,

    /// Vision model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for the vision engine (72–400).
    #[arg(long, env = "PDFINGEST_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Engine-level retries per page on provider errors.
    #[arg(long, env = "PDFINGEST_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Path to a libpdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Path to a text file holding a custom system prompt.
    #[arg(long, env = "PDFINGEST_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Storage target.
    #[arg(long, env = "PDFINGEST_STORE", value_enum, default_value = "gs")]
    store: StoreArg,

    /// GCS bucket.
    #[arg(long, env = "DEFAULT_BUCKET", default_value = "cesgs-dart")]
    bucket: String,

    /// GCS OAuth2 bearer token.
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    gcs_token: Option<String>,

    /// Root directory for `--store local`.
    #[arg(long, env = "PDFINGEST_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Storage key prefix.
    #[arg(long, env = "PDFINGEST_KEY_PREFIX", default_value = "parsed")]
    prefix: String,

    /// Directory for temporary files.
    #[arg(long, env = "PDFINGEST_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFINGEST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page conversion timeout in seconds.
    #[arg(long, env = "PDFINGEST_PAGE_TIMEOUT")]
    page_timeout: Option<u64>,

    /// Split + conversion budget per document in seconds.
    #[arg(long, env = "PDFINGEST_RUN_TIMEOUT")]
    run_timeout: Option<u64>,

    /// Exit non-zero when any page or document failed.
    #[arg(long, env = "PDFINGEST_STRICT")]
    strict: bool,

    /// Print the run report(s) as JSON on stdout.
    #[arg(long, env = "PDFINGEST_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDFINGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFINGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFINGEST_QUIET")]
    quiet: bool,
}

impl CommonArgs {
    fn init_logging(&self, progress_active: bool) {
        let filter = if self.verbose {
            "debug"
        } else if self.quiet || progress_active {
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
    }

    fn ingest_config(&self, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
        let mut builder = IngestConfig::builder()
            .concurrency(self.threads)
            .testing(self.testing)
            .key_prefix(self.prefix.clone())
            .download_timeout_secs(self.download_timeout);
        if let Some(limit) = self.page_limit {
            builder = builder.page_limit(limit);
        }
        if let Some(secs) = self.page_timeout {
            builder = builder.convert_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.run_timeout {
            builder = builder.run_timeout(Duration::from_secs(secs));
        }
        if let Some(ref dir) = self.scratch_dir {
            builder = builder.scratch_dir(dir.clone());
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }
        builder.build().context("Invalid configuration")
    }

    async fn converter(&self) -> Result<Arc<dyn PageConverter>> {
        match EngineKind::from(self.engine) {
            EngineKind::Text => Ok(Arc::new(TextLayerConverter::new())),
            EngineKind::Vision => {
                let mut builder = VisionConfig::builder()
                    .dpi(self.dpi)
                    .max_retries(self.max_retries)
                    .languages(&self.languages);
                if let Some(ref model) = self.model {
                    builder = builder.model(model.clone());
                }
                if let Some(ref provider) = self.provider {
                    builder = builder.provider_name(provider.clone());
                }
                if let Some(ref lib) = self.pdfium_lib {
                    builder = builder.pdfium_library(lib.clone());
                }
                if let Some(ref path) = self.system_prompt {
                    let prompt = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read system prompt from {path:?}"))?;
                    builder = builder.system_prompt(prompt);
                }
                let config = builder.build().context("Invalid vision configuration")?;
                Ok(Arc::new(VisionConverter::new(config)))
            }
        }
    }

    fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        match self.store {
            StoreArg::Local => Ok(Arc::new(LocalStore::new(self.out_dir.clone()))),
            StoreArg::Gs => {
                if self.gcs_token.is_none() {
                    warn!("No GCS_ACCESS_TOKEN set; uploads to gs://{} are anonymous", self.bucket);
                }
                let store = GcsStore::new(self.bucket.clone(), self.gcs_token.clone(), 120)
                    .context("Failed to build GCS client")?;
                Ok(Arc::new(store))
            }
        }
    }

    async fn pipeline(&self, progress: Option<ProgressCallback>) -> Result<DocumentPipeline> {
        Ok(DocumentPipeline::new(
            self.ingest_config(progress)?,
            self.converter().await?,
            self.store()?,
        ))
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Parse {
            source,
            doc_id,
            common,
        } => parse_one(&source, &doc_id, &common).await,
        Command::Batch {
            manifest,
            docs,
            common,
        } => batch(&manifest, docs, &common).await,
    }
}

async fn parse_one(source: &str, doc_id: &str, common: &CommonArgs) -> Result<()> {
    let show_progress = !common.quiet && !common.no_progress && !common.json;
    common.init_logging(show_progress);

    let progress: Option<ProgressCallback> = if show_progress {
        Some(PageProgress::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };
    let pipeline = common.pipeline(progress).await?;

    let report = match pipeline.run(&SourceDocument::new(doc_id, source)).await {
        Ok(report) => report,
        Err(IngestError::PersistFailed {
            key,
            source: store_err,
            report,
        }) => {
            eprintln!(
                "{} {} page(s) converted but not stored at {}: {}",
                red("✘"),
                report.document.len(),
                key,
                store_err
            );
            anyhow::bail!("Persisting document '{doc_id}' failed");
        }
        Err(e) => return Err(e).with_context(|| format!("Ingesting document '{doc_id}' failed")),
    };

    if common.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !common.quiet {
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            if report.has_failures() { yellow("⚠") } else { green("✔") },
            report.stats.converted_pages,
            report.stats.dispatched_pages,
            report.stats.total_duration_ms,
            bold(report.persisted_key.as_deref().unwrap_or("-")),
        );
        for failure in &report.failures {
            eprintln!("   {} {}", red("✗"), failure);
        }
    }

    if common.strict {
        report.into_result()?;
    }
    Ok(())
}

async fn batch(manifest: &Path, docs: usize, common: &CommonArgs) -> Result<()> {
    common.init_logging(false);

    let entries = load_manifest(manifest)
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
    let entries = entries
        .into_iter()
        .map(|mut e| {
            e.source = edgequake_pdfingest::batch::resolve_relative(manifest, &e.source);
            e
        })
        .collect::<Vec<_>>();

    if !common.quiet {
        eprintln!("Starting parsing {} documents...", entries.len());
    }

    let pipeline = common.pipeline(None).await?;
    let quiet = common.quiet;
    let summary = run_batch_with(&pipeline, entries, docs, |pos, total, outcome| {
        if quiet {
            return;
        }
        match &outcome.result {
            Ok(report) if report.has_failures() => eprintln!(
                "[{pos}/{total}] doc_id={} {} ({} page(s) failed)",
                outcome.entry.doc_id,
                yellow("Done"),
                report.failures.len()
            ),
            Ok(_) => eprintln!("[{pos}/{total}] doc_id={} {}", outcome.entry.doc_id, green("Done")),
            Err(e) => eprintln!("[{pos}/{total}] doc_id={} {} {}", outcome.entry.doc_id, red("Error:"), e),
        }
    })
    .await;

    if common.json {
        let reports: Vec<_> = summary
            .outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise reports")?
        );
    }
    if !common.quiet {
        eprintln!(
            "All documents processed: {} succeeded, {} failed.",
            summary.succeeded(),
            summary.failed()
        );
    }

    if common.strict && (summary.failed() > 0 || summary.with_page_failures() > 0) {
        anyhow::bail!(
            "{} document(s) failed, {} with page failures",
            summary.failed(),
            summary.with_page_failures()
        );
    }
    Ok(())
}
