//! Progress-callback trait for per-document and per-page events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to follow a run:
//! forward events to a terminal progress bar, a channel, or a metrics sink.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfingest::{IngestConfig, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, doc_id: &str, page_number: usize, markdown_len: usize) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{doc_id}: page {page_number} done ({markdown_len} bytes)");
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { converted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes a document.
///
/// With `concurrency > 1` the per-page methods are called concurrently and
/// in completion order. All methods default to no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once the page cap is applied, before any page is dispatched.
    ///
    /// * `total_pages`: pages that will be dispatched
    fn on_document_start(&self, doc_id: &str, total_pages: usize) {
        let _ = (doc_id, total_pages);
    }

    /// Called just before a page is handed to the converter.
    fn on_page_start(&self, doc_id: &str, page_number: usize) {
        let _ = (doc_id, page_number);
    }

    /// Called when a page converted successfully.
    fn on_page_complete(&self, doc_id: &str, page_number: usize, markdown_len: usize) {
        let _ = (doc_id, page_number, markdown_len);
    }

    /// Called when a page failed conversion.
    fn on_page_error(&self, doc_id: &str, page_number: usize, error: &str) {
        let _ = (doc_id, page_number, error);
    }

    /// Called once after every dispatched page has an outcome.
    fn on_document_complete(&self, doc_id: &str, total_pages: usize, success_count: usize) {
        let _ = (doc_id, total_pages, success_count);
    }
}

/// A no-op implementation.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
