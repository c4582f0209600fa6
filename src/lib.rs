//! # edgequake-pdfingest
//!
//! Ingest PDF documents page by page: split a PDF into single pages, convert
//! each page to Markdown, and persist the pages as one JSON array of records.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (path or URL)
//!  │
//!  ├─ 1. Resolve   validate local file or download into scratch dir
//!  ├─ 2. Split     pages 1..=limit → single-page PDFs (lopdf, spawn_blocking)
//!  ├─ 3. Dispatch  PageConverter per page, bounded concurrency, failures isolated
//!  ├─ 4. Assemble  successes → ordered records with UUIDs, failures → report
//!  ├─ 5. Persist   {prefix}/{doc_id}.json to an ObjectStore
//!  └─ 6. Cleanup   every temp file removed, on every exit path
//! ```
//!
//! The stored artifact is a JSON array:
//!
//! ```json
//! [{"id":"5f0c…","page_content":"# Informe anual\n…","metadata":{"page_number":1,"doc_id":"1042"}}]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfingest::{DocumentPipeline, GcsStore, IngestConfig, VisionConfig, VisionConverter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = DocumentPipeline::new(
//!         IngestConfig::builder().concurrency(4).build()?,
//!         Arc::new(VisionConverter::new(VisionConfig::default())),
//!         Arc::new(GcsStore::new("cesgs-dart", std::env::var("GCS_TOKEN").ok(), 60)?),
//!     );
//!     let report = pipeline.parse("https://example.org/informe.pdf", "1042").await?;
//!     eprintln!("{} pages stored, {} failed", report.document.len(), report.failures.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! edgequake-pdfingest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{load_manifest, run_batch, run_batch_with, BatchEntry, BatchOutcome, BatchSummary};
pub use config::{
    IngestConfig, IngestConfigBuilder, VisionConfig, VisionConfigBuilder, DEFAULT_KEY_PREFIX,
    TESTING_PAGE_CAP,
};
pub use engine::{EngineKind, TextLayerConverter, VisionConverter};
pub use error::{ConversionError, EngineError, IngestError, SplitError, StoreError};
pub use ingest::{DocumentPipeline, Stage};
pub use output::{
    IngestReport, IngestStats, PageFailureReport, PageMetadata, PageRecord, ParsedDocument,
    SourceDocument, SourceLocation,
};
pub use pipeline::dispatch::{ConversionOutcome, PageConverter};
pub use pipeline::split::{LopdfBackend, PageArtifact, PdfBackend, PdfSource};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{GcsStore, LocalStore, MemoryStore, ObjectStore};
