//! Batch ingestion from a manifest of `(source, doc_id)` rows.
//!
//! Manifests are spreadsheets (`.xlsx`, `.xlsm`, `.xls`, `.ods`, first sheet)
//! or `.csv` files with a header row naming a `source` and a `doc_id`
//! column, in any order and case. Other columns are ignored.
//!
//! A failing document never stops the batch; every row gets an outcome.

use crate::error::IngestError;
use crate::ingest::DocumentPipeline;
use crate::output::{IngestReport, SourceDocument};
use calamine::{open_workbook_auto, Data, Reader};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One document to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// 1-based data row in the manifest (header excluded).
    pub row: usize,
    pub source: String,
    pub doc_id: String,
}

impl BatchEntry {
    pub fn to_source_document(&self) -> SourceDocument {
        SourceDocument::new(self.doc_id.clone(), &self.source)
    }
}

/// Result of one batch row.
#[derive(Debug)]
pub struct BatchOutcome {
    pub entry: BatchEntry,
    pub result: Result<IngestReport, IngestError>,
}

/// All outcomes, in manifest order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Documents that persisted but had at least one failed page.
    pub fn with_page_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Ok(r) if r.has_failures()))
            .count()
    }
}

// ── Manifest loading ─────────────────────────────────────────────────────

/// Read a manifest, dispatching on the file extension.
pub fn load_manifest(path: &Path) -> Result<Vec<BatchEntry>, IngestError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let rows = match ext.as_str() {
        "csv" => read_csv_rows(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_sheet_rows(path)?,
        other => {
            return Err(manifest_err(
                path,
                format!("unsupported manifest type '.{other}' (expected .xlsx, .xls, .ods or .csv)"),
            ))
        }
    };
    entries_from_rows(path, rows)
}

fn manifest_err(path: &Path, detail: impl Into<String>) -> IngestError {
    IngestError::Manifest {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| manifest_err(path, e.to_string()))?;

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| manifest_err(path, e.to_string()))
        })
        .collect()
}

fn read_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>, IngestError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| manifest_err(path, e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| manifest_err(path, "workbook has no sheets"))?
        .map_err(|e| manifest_err(path, e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

/// Spreadsheet cell as text. Whole floats lose their `.0` so numeric ids
/// such as `1042` stay `1042`.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

fn entries_from_rows(path: &Path, rows: Vec<Vec<String>>) -> Result<Vec<BatchEntry>, IngestError> {
    let mut rows = rows.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| manifest_err(path, "manifest is empty"))?;

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| manifest_err(path, format!("missing '{name}' column")))
    };
    let source_col = column("source")?;
    let doc_id_col = column("doc_id")?;

    let mut entries = Vec::new();
    for (i, row) in rows.enumerate() {
        let cell = |col: usize| row.get(col).map(|s| s.trim()).unwrap_or("");
        let (source, doc_id) = (cell(source_col), cell(doc_id_col));
        if source.is_empty() && doc_id.is_empty() {
            continue;
        }
        if source.is_empty() || doc_id.is_empty() {
            warn!(
                "{}: row {} skipped (source or doc_id blank)",
                path.display(),
                i + 1
            );
            continue;
        }
        entries.push(BatchEntry {
            row: i + 1,
            source: source.to_string(),
            doc_id: doc_id.to_string(),
        });
    }
    Ok(entries)
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Run every entry, `concurrency` documents at a time.
pub async fn run_batch(
    pipeline: &DocumentPipeline,
    entries: Vec<BatchEntry>,
    concurrency: usize,
) -> BatchSummary {
    run_batch_with(pipeline, entries, concurrency, |_, _, _| {}).await
}

/// Like [`run_batch`], calling `on_done(position, total, outcome)` as each
/// document finishes. `position` counts completions from 1.
pub async fn run_batch_with<F>(
    pipeline: &DocumentPipeline,
    entries: Vec<BatchEntry>,
    concurrency: usize,
    on_done: F,
) -> BatchSummary
where
    F: Fn(usize, usize, &BatchOutcome),
{
    let total = entries.len();
    info!("Starting batch of {} document(s)", total);

    let mut completed = 0usize;
    let mut indexed: Vec<(usize, BatchOutcome)> = Vec::with_capacity(total);
    let mut results = stream::iter(entries.into_iter().enumerate().map(|(idx, entry)| async move {
        let result = pipeline.run(&entry.to_source_document()).await;
        (idx, BatchOutcome { entry, result })
    }))
    .buffer_unordered(concurrency.max(1));

    while let Some((idx, outcome)) = results.next().await {
        completed += 1;
        match &outcome.result {
            Ok(_) => info!("[{}/{}] doc_id={} done", completed, total, outcome.entry.doc_id),
            Err(e) => warn!(
                "[{}/{}] doc_id={} failed: {}",
                completed, total, outcome.entry.doc_id, e
            ),
        }
        on_done(completed, total, &outcome);
        indexed.push((idx, outcome));
    }

    indexed.sort_by_key(|(idx, _)| *idx);
    let summary = BatchSummary {
        outcomes: indexed.into_iter().map(|(_, o)| o).collect(),
    };
    info!(
        "Batch finished: {} succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );
    summary
}

/// Resolve a relative `source` against the manifest's directory.
///
/// URLs and absolute paths are returned unchanged.
pub fn resolve_relative(manifest: &Path, source: &str) -> String {
    if crate::pipeline::input::is_url(source) || Path::new(source).is_absolute() {
        return source.to_string();
    }
    let base = manifest.parent().map(Path::to_path_buf).unwrap_or_default();
    let joined: PathBuf = base.join(source);
    joined.to_string_lossy().into_owned()
}
