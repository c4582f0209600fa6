//! Pipeline stages for document ingestion.
//!
//! Each submodule implements one step; [`crate::ingest::DocumentPipeline`]
//! composes them.
//!
//! ```text
//! input ──▶ split ──▶ dispatch ──▶ assemble ──▶ (store)
//! (URL/path) (lopdf)  (converter)   (records)
//!   └───────────┴──── janitor: every temp file, released on every exit path
//! ```
//!
//! 1. [`input`]   : validate a local path or download a URL into a temp file
//! 2. [`split`]   : extract pages `1..=limit` into single-page PDFs
//! 3. [`dispatch`]: run the [`dispatch::PageConverter`] with bounded
//!    concurrency; one outcome per page, failures isolated
//! 4. [`assemble`]: successes become ordered page records, failures become
//!    reports
//! 5. [`janitor`] : scoped ownership of every temp file

pub mod assemble;
pub mod dispatch;
pub mod input;
pub mod janitor;
pub mod split;
