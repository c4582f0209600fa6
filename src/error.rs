//! Error types for the edgequake-pdfingest library.
//!
//! Failures fall into two groups:
//!
//! * [`IngestError`]: **Fatal**: the document run cannot produce a durable
//!   artifact (bad source, unreadable PDF, engine unavailable, storage down).
//!   Returned as `Err(IngestError)` from [`crate::DocumentPipeline::run`].
//!
//! * [`ConversionError`]: **Non-fatal**: one page could not be converted.
//!   The dispatcher folds it into a failed outcome and the run continues;
//!   callers see it as a [`crate::output::PageFailureReport`].
//!
//! A persistence failure is fatal to durability but not to the computation:
//! [`IngestError::PersistFailed`] carries the assembled report so the
//! converted pages are never thrown away.

use crate::output::IngestReport;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by a document run.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// Local source file was not found.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the source file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The source string is neither a file path nor an HTTP(S) URL.
    #[error("Invalid source '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The document id cannot be used as a storage key segment.
    #[error("Invalid document id '{doc_id}': must be non-empty without '/', '\\' or '..'")]
    InvalidDocId { doc_id: String },

    /// Remote fetch failed (DNS, TLS, non-2xx status, truncated body).
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Remote fetch exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The source was read but does not start with the `%PDF` magic.
    #[error("Source is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Splitting the source into single-page artifacts failed.
    #[error(transparent)]
    Split(#[from] SplitError),

    /// The conversion engine could not be initialised; no page was dispatched.
    #[error("Conversion engine '{engine}' is unavailable: {detail}")]
    EngineUnavailable { engine: String, detail: String },

    /// Splitting plus dispatch did not finish within the run timeout.
    /// Nothing is persisted for a timed-out run.
    #[error("Run for document '{doc_id}' timed out after {elapsed_ms}ms")]
    TimedOut { doc_id: String, elapsed_ms: u64 },

    /// The page records were assembled but could not be written to storage.
    ///
    /// `report` still holds the full in-memory result; see
    /// [`IngestError::partial_report`].
    #[error("Failed to persist '{key}': {source}")]
    PersistFailed {
        key: String,
        #[source]
        source: StoreError,
        report: Box<IngestReport>,
    },

    /// Some pages failed conversion.
    ///
    /// Returned by [`IngestReport::into_result`] when the caller wants to
    /// treat any page failure as an error.
    #[error("{failed}/{total} pages failed for document '{doc_id}'")]
    PartialFailure {
        doc_id: String,
        failed: usize,
        total: usize,
    },

    // ── Config / batch errors ─────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A batch manifest could not be read.
    #[error("Invalid manifest '{path}': {detail}")]
    Manifest { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task join failure, temp file creation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// The in-memory result of a run whose only failure was persistence.
    pub fn partial_report(&self) -> Option<&IngestReport> {
        match self {
            IngestError::PersistFailed { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Consume the error, keeping the computed report when there is one.
    pub fn into_partial_report(self) -> Option<IngestReport> {
        match self {
            IngestError::PersistFailed { report, .. } => Some(*report),
            _ => None,
        }
    }
}

/// Errors raised while splitting a PDF into single-page artifacts.
///
/// Every variant aborts the split for that document: skipping a page here
/// would leave a gap in the page range before dispatch even starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SplitError {
    /// The source could not be opened or parsed as a PDF.
    #[error("PDF '{path}' is unreadable: {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// The PDF parsed but contains zero pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// A single page could not be extracted into its own file.
    #[error("Failed to extract page {page}: {detail}")]
    PageExtractionFailed { page: usize, detail: String },

    /// The run gave up on the split; `page` was never started.
    #[error("Split cancelled before page {page}")]
    Cancelled { page: usize },
}

/// A non-fatal failure converting one page.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    /// The engine ran but reported an error for this page.
    #[error("conversion failed: {0}")]
    Rejected(String),

    /// The engine did not answer within the per-page timeout.
    #[error("conversion timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The engine panicked while converting this page.
    #[error("conversion panicked: {0}")]
    Panicked(String),
}

/// The conversion engine cannot run at all.
#[derive(Debug, Clone, Error)]
#[error("{engine}: {detail}")]
pub struct EngineError {
    pub engine: String,
    pub detail: String,
}

impl From<EngineError> for IngestError {
    fn from(e: EngineError) -> Self {
        IngestError::EngineUnavailable {
            engine: e.engine,
            detail: e.detail,
        }
    }
}

/// Errors from an [`crate::store::ObjectStore`] write.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response (connect, TLS, timeout).
    #[error("storage request failed: {0}")]
    Request(String),

    /// The storage service answered with a non-success status.
    #[error("storage returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Local filesystem write failed.
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload could not be serialised to JSON.
    #[error("failed to serialise payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = IngestError::PartialFailure {
            doc_id: "doc-7".into(),
            failed: 1,
            total: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/5"), "got: {msg}");
        assert!(msg.contains("doc-7"), "got: {msg}");
    }

    #[test]
    fn split_error_is_transparent() {
        let e: IngestError = SplitError::PageExtractionFailed {
            page: 3,
            detail: "bad xref".into(),
        }
        .into();
        assert_eq!(e.to_string(), "Failed to extract page 3: bad xref");
    }

    #[test]
    fn engine_error_maps_to_unavailable() {
        let e: IngestError = EngineError {
            engine: "vision".into(),
            detail: "no API key".into(),
        }
        .into();
        assert!(matches!(e, IngestError::EngineUnavailable { .. }));
        assert!(e.to_string().contains("no API key"));
    }

    #[test]
    fn partial_report_only_for_persist_failures() {
        let e = IngestError::InvalidConfig("x".into());
        assert!(e.partial_report().is_none());
        assert!(e.into_partial_report().is_none());
    }

    #[test]
    fn conversion_timeout_display() {
        let e = ConversionError::Timeout { ms: 250 };
        assert!(e.to_string().contains("250ms"));
    }
}
