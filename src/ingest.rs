//! Document pipeline orchestration.
//!
//! One [`DocumentPipeline::run`] walks a document through
//!
//! ```text
//! Resolving → Splitting → Dispatching → Assembling → Persisting → Cleanup
//!     │           │            │                          │
//!     └───────────┴────────────┴──── fatal error ─────────┴──▶ Cleanup → Err
//! ```
//!
//! Cleanup runs on every exit path: every temp file of the run is owned by a
//! per-run [`ResourceJanitor`] that is released before `run` returns.
//!
//! Page failures are not fatal. They land in [`IngestReport::failures`] and
//! the remaining pages are persisted; use [`IngestReport::into_result`] to
//! treat them as an error.

use crate::config::IngestConfig;
use crate::error::{IngestError, StoreError};
use crate::output::{IngestReport, IngestStats, SourceDocument};
use crate::pipeline::assemble::assemble;
use crate::pipeline::dispatch::{dispatch, ConversionOutcome, DispatchOptions, PageConverter};
use crate::pipeline::input::resolve_source;
use crate::pipeline::janitor::ResourceJanitor;
use crate::pipeline::split::{spawn_split, LopdfBackend, PdfBackend, SplitOutput};
use crate::store::ObjectStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run states, used in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Splitting,
    Dispatching,
    Assembling,
    Persisting,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Resolving => "resolving",
            Stage::Splitting => "splitting",
            Stage::Dispatching => "dispatching",
            Stage::Assembling => "assembling",
            Stage::Persisting => "persisting",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Check that `doc_id` is usable as the last segment of a storage key.
pub fn validate_doc_id(doc_id: &str) -> Result<(), IngestError> {
    let bad = doc_id.trim().is_empty()
        || doc_id.contains('/')
        || doc_id.contains('\\')
        || doc_id.contains("..");
    if bad {
        return Err(IngestError::InvalidDocId {
            doc_id: doc_id.to_string(),
        });
    }
    Ok(())
}

/// Orchestrates resolve → split → dispatch → assemble → persist for one
/// document at a time.
///
/// Cheap to share: every collaborator sits behind an `Arc`, and runs share no
/// mutable state, so one pipeline can serve concurrent runs.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfingest::{DocumentPipeline, IngestConfig, MemoryStore, TextLayerConverter};
/// use std::sync::Arc;
///
/// # async fn demo() -> Result<(), edgequake_pdfingest::IngestError> {
/// let pipeline = DocumentPipeline::new(
///     IngestConfig::builder().testing(true).build()?,
///     Arc::new(TextLayerConverter::new()),
///     Arc::new(MemoryStore::new()),
/// );
/// let report = pipeline.parse("report.pdf", "1042").await?;
/// println!("{} pages stored at {:?}", report.document.len(), report.persisted_key);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocumentPipeline {
    config: Arc<IngestConfig>,
    backend: Arc<dyn PdfBackend>,
    converter: Arc<dyn PageConverter>,
    store: Arc<dyn ObjectStore>,
}

impl fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("config", &self.config)
            .field("converter", &self.converter.name())
            .field("store", &self.store.describe())
            .finish()
    }
}

impl DocumentPipeline {
    /// Pipeline with the default lopdf splitting backend.
    pub fn new(
        config: IngestConfig,
        converter: Arc<dyn PageConverter>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend: Arc::new(LopdfBackend),
            converter,
            store,
        }
    }

    /// Replace the PDF splitting backend.
    pub fn with_backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Storage key the document `doc_id` is written to.
    pub fn storage_key(&self, doc_id: &str) -> String {
        self.config.storage_key(doc_id)
    }

    /// Run a document given as a path or URL string.
    pub async fn parse(&self, source: &str, doc_id: &str) -> Result<IngestReport, IngestError> {
        self.run(&SourceDocument::new(doc_id, source)).await
    }

    /// Run one document end to end.
    ///
    /// On success the report's `persisted_key` is set. On
    /// [`IngestError::PersistFailed`] the computed report rides inside the
    /// error. Every temp file created for the run is gone when this returns.
    pub async fn run(&self, source: &SourceDocument) -> Result<IngestReport, IngestError> {
        validate_doc_id(&source.doc_id)?;

        let janitor = Arc::new(ResourceJanitor::new());
        let result = self.run_stages(source, &janitor).await;

        debug!("[{}] {}", source.doc_id, Stage::Cleanup);
        let released = janitor.release_all();
        if released.failed > 0 {
            warn!(
                "[{}] {} temp file(s) could not be removed",
                source.doc_id, released.failed
            );
        }
        info!(
            "[{}] {}: {} temp file(s) removed, {} already gone",
            source.doc_id,
            Stage::Cleanup,
            released.removed,
            released.missing
        );

        match &result {
            Ok(report) => info!(
                "[{}] done: {}/{} pages converted",
                source.doc_id, report.stats.converted_pages, report.stats.dispatched_pages
            ),
            Err(e) => warn!("[{}] failed: {}", source.doc_id, e),
        }
        result
    }

    async fn run_stages(
        &self,
        source: &SourceDocument,
        janitor: &Arc<ResourceJanitor>,
    ) -> Result<IngestReport, IngestError> {
        let doc_id = source.doc_id.as_str();
        let start = Instant::now();
        let scratch_dir = self.config.scratch_dir();

        info!("[{}] {} {}", doc_id, Stage::Resolving, source.location);
        let resolved = resolve_source(
            &source.location,
            self.config.download_timeout_secs,
            &scratch_dir,
            janitor,
        )
        .await?;

        let deadline = self
            .config
            .run_timeout
            .map(|limit| tokio::time::Instant::now() + limit);
        let timed_out = || IngestError::TimedOut {
            doc_id: doc_id.to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!("[{}] {}", doc_id, Stage::Splitting);
        let split_start = Instant::now();
        let split = self
            .split(resolved.path, scratch_dir, janitor, deadline, timed_out)
            .await?;
        let split_ms = split_start.elapsed().as_millis() as u64;

        let dispatch_start = Instant::now();
        let work = self.prepare_and_dispatch(doc_id, &split);
        let outcomes = match deadline {
            Some(at) => tokio::time::timeout_at(at, work)
                .await
                .map_err(|_| timed_out())??,
            None => work.await?,
        };
        let dispatch_ms = dispatch_start.elapsed().as_millis() as u64;

        info!("[{}] {}", doc_id, Stage::Assembling);
        let dispatched_pages = outcomes.len();
        let (document, failures) = assemble(outcomes, doc_id);
        let mut report = IngestReport {
            doc_id: doc_id.to_string(),
            stats: IngestStats {
                total_pages: split.total_pages,
                dispatched_pages,
                converted_pages: document.len(),
                failed_pages: failures.len(),
                split_duration_ms: split_ms,
                dispatch_duration_ms: dispatch_ms,
                total_duration_ms: 0,
            },
            document,
            failures,
            persisted_key: None,
        };

        let key = self.config.storage_key(doc_id);
        info!(
            "[{}] {} {} record(s) to {}/{}",
            doc_id,
            Stage::Persisting,
            report.document.len(),
            self.store.describe(),
            key
        );
        let persisted = match report.document.to_json_bytes() {
            Ok(payload) => self.store.put_json(&key, &payload).await,
            Err(e) => Err(StoreError::from(e)),
        };
        report.stats.total_duration_ms = start.elapsed().as_millis() as u64;

        match persisted {
            Ok(()) => {
                report.persisted_key = Some(key);
                Ok(report)
            }
            Err(source) => Err(IngestError::PersistFailed {
                key,
                source,
                report: Box::new(report),
            }),
        }
    }

    /// Split on the blocking pool. Past `deadline` the split is cancelled
    /// and joined, so no page file is written after this returns, and the
    /// error comes from `on_deadline`.
    async fn split(
        &self,
        pdf_path: PathBuf,
        scratch_dir: PathBuf,
        janitor: &Arc<ResourceJanitor>,
        deadline: Option<tokio::time::Instant>,
        on_deadline: impl FnOnce() -> IngestError,
    ) -> Result<SplitOutput, IngestError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut task = spawn_split(
            Arc::clone(&self.backend),
            pdf_path,
            self.config.page_limit,
            scratch_dir,
            Arc::clone(janitor),
            Arc::clone(&cancel),
        );

        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.store(true, Ordering::SeqCst);
                    debug!("Split past deadline, waiting for the page in progress");
                    let _ = task.await;
                    return Err(on_deadline());
                }
            },
            None => task.await,
        };
        joined
            .map_err(|e| IngestError::Internal(format!("Split task panicked: {e}")))?
            .map_err(IngestError::from)
    }

    async fn prepare_and_dispatch(
        &self,
        doc_id: &str,
        split: &SplitOutput,
    ) -> Result<Vec<ConversionOutcome>, IngestError> {
        info!(
            "[{}] {} {} of {} page(s) via {} (concurrency {})",
            doc_id,
            Stage::Dispatching,
            split.artifacts.len(),
            split.total_pages,
            self.converter.name(),
            self.config.concurrency
        );
        self.converter.prepare().await?;

        let progress = self.config.progress_callback.as_ref();
        if let Some(cb) = progress {
            cb.on_document_start(doc_id, split.artifacts.len());
        }

        let options = DispatchOptions {
            concurrency: self.config.concurrency,
            convert_timeout: self.config.convert_timeout,
            doc_id,
            progress,
        };
        let outcomes = dispatch(&split.artifacts, self.converter.as_ref(), &options).await;

        if let Some(cb) = progress {
            let ok = outcomes.iter().filter(|o| o.is_success()).count();
            cb.on_document_complete(doc_id, outcomes.len(), ok);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Resolving.to_string(), "resolving");
        assert_eq!(Stage::Cleanup.to_string(), "cleanup");
    }

    #[test]
    fn doc_id_validation() {
        assert!(validate_doc_id("1042").is_ok());
        assert!(validate_doc_id("informe-2023_v2").is_ok());
        for bad in ["", "  ", "a/b", "..", "a\\b"] {
            assert!(
                matches!(validate_doc_id(bad), Err(IngestError::InvalidDocId { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
