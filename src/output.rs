//! Data model: what goes into a run and what comes out of it.
//!
//! [`ParsedDocument`] is the exact payload persisted to storage. Its JSON form
//! is a plain array of [`PageRecord`] objects:
//!
//! ```json
//! [{"id":"<uuid-v4>","page_content":"# Title\n","metadata":{"page_number":1,"doc_id":"doc-1"}}]
//! ```

use crate::error::{ConversionError, IngestError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Where a source PDF lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLocation {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// An HTTP(S) URL to download before splitting.
    Url(String),
}

impl SourceLocation {
    /// Classify a user-supplied string: `http://` / `https://` prefixes are
    /// URLs, anything else is a local path.
    pub fn parse(input: &str) -> Self {
        if crate::pipeline::input::is_url(input) {
            SourceLocation::Url(input.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(input))
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Path(p) => write!(f, "{}", p.display()),
            SourceLocation::Url(u) => f.write_str(u),
        }
    }
}

/// A document to ingest. `doc_id` uniqueness is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub doc_id: String,
    pub location: SourceLocation,
}

impl SourceDocument {
    pub fn new(doc_id: impl Into<String>, location: impl AsRef<str>) -> Self {
        Self {
            doc_id: doc_id.into(),
            location: SourceLocation::parse(location.as_ref()),
        }
    }
}

/// Per-page metadata stored alongside the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// 1-indexed page number in the source PDF.
    pub page_number: usize,
    pub doc_id: String,
}

/// One successfully converted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Fresh v4 UUID generated at assembly time.
    pub id: Uuid,
    pub page_content: String,
    pub metadata: PageMetadata,
}

impl PageRecord {
    pub fn new(page_number: usize, doc_id: &str, page_content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_content,
            metadata: PageMetadata {
                page_number,
                doc_id: doc_id.to_string(),
            },
        }
    }
}

/// Page records sorted ascending by page number; failed pages are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParsedDocument {
    records: Vec<PageRecord>,
}

impl ParsedDocument {
    /// Build a document, restoring ascending page order.
    pub fn from_records(mut records: Vec<PageRecord>) -> Self {
        records.sort_by_key(|r| r.metadata.page_number);
        Self { records }
    }

    pub fn records(&self) -> &[PageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PageRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn page_numbers(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.metadata.page_number).collect()
    }

    /// Serialise to the persisted JSON array.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.records)
    }
}

/// Diagnostic for a page that was dispatched but produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailureReport {
    pub page_number: usize,
    pub doc_id: String,
    pub reason: ConversionError,
}

impl fmt::Display for PageFailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "document '{}' page {}: {}",
            self.doc_id, self.page_number, self.reason
        )
    }
}

/// Counters for one document run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Page count reported by the source PDF.
    pub total_pages: usize,
    /// Pages split and dispatched after the page cap was applied.
    pub dispatched_pages: usize,
    pub converted_pages: usize,
    pub failed_pages: usize,
    pub split_duration_ms: u64,
    pub dispatch_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a document run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub document: ParsedDocument,
    /// One entry per failed page, ascending by page number.
    pub failures: Vec<PageFailureReport>,
    pub stats: IngestStats,
    /// Storage key the document was written to; `None` when persistence failed.
    pub persisted_key: Option<String>,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Treat any page failure as an error.
    pub fn into_result(self) -> Result<IngestReport, IngestError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(IngestError::PartialFailure {
                doc_id: self.doc_id,
                failed: self.stats.failed_pages,
                total: self.stats.dispatched_pages,
            })
        }
    }
}
