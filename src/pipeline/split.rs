//! Page splitting: one source PDF → N single-page PDF artifacts.
//!
//! The PDF format itself sits behind [`PdfBackend`]; [`LopdfBackend`] is the
//! default, a pure-Rust implementation that needs no native library.
//!
//! Splitting is blocking file I/O, so [`spawn_split`] runs it on the blocking
//! pool, the same way rasterisation is kept off the async workers.

use crate::error::SplitError;
use crate::pipeline::janitor::ResourceJanitor;
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A transient single-page PDF, tagged with its 1-indexed page number.
///
/// The backing file is owned by the run's [`ResourceJanitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    pub page_number: usize,
    pub path: PathBuf,
}

/// An opened source PDF.
pub trait PdfSource: Send {
    fn page_count(&self) -> usize;

    /// Write page `page_number` (1-indexed) as a standalone PDF to `dest`.
    fn extract_page(&self, page_number: usize, dest: &Path) -> Result<(), SplitError>;
}

/// Capability to open PDFs for splitting.
pub trait PdfBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfSource>, SplitError>;
}

/// [`PdfBackend`] built on `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfSource>, SplitError> {
        let document = Document::load(path).map_err(|e| SplitError::Unreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(Box::new(LopdfSource { document }))
    }
}

struct LopdfSource {
    document: Document,
}

impl PdfSource for LopdfSource {
    fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    fn extract_page(&self, page_number: usize, dest: &Path) -> Result<(), SplitError> {
        let pages = self.document.get_pages();
        let total = pages.len();
        if page_number == 0 || page_number > total {
            return Err(SplitError::PageExtractionFailed {
                page: page_number,
                detail: format!("out of range (1-{total})"),
            });
        }

        let others: Vec<u32> = pages
            .keys()
            .copied()
            .filter(|&n| n as usize != page_number)
            .collect();

        let mut single = self.document.clone();
        single.delete_pages(&others);
        single.prune_objects();
        single
            .save(dest)
            .map_err(|e| SplitError::PageExtractionFailed {
                page: page_number,
                detail: e.to_string(),
            })?;
        Ok(())
    }
}

/// Number of pages to split: the whole document, or the cap if smaller.
pub fn effective_limit(total_pages: usize, page_limit: Option<usize>) -> usize {
    match page_limit {
        Some(limit) => total_pages.min(limit),
        None => total_pages,
    }
}

/// Split `pdf_path` into single-page artifacts numbered `1..=limit`.
///
/// Each temp file is handed to `janitor` before the page is written into it.
/// Any extraction failure aborts the whole split.
pub fn split(
    backend: &dyn PdfBackend,
    pdf_path: &Path,
    page_limit: Option<usize>,
    scratch_dir: &Path,
    janitor: &ResourceJanitor,
) -> Result<Vec<PageArtifact>, SplitError> {
    let source = backend.open(pdf_path)?;
    split_source(
        &*source,
        pdf_path,
        page_limit,
        scratch_dir,
        janitor,
        &AtomicBool::new(false),
    )
}

/// `cancel` is checked before each page; once set, no new file is created.
fn split_source(
    source: &dyn PdfSource,
    pdf_path: &Path,
    page_limit: Option<usize>,
    scratch_dir: &Path,
    janitor: &ResourceJanitor,
    cancel: &AtomicBool,
) -> Result<Vec<PageArtifact>, SplitError> {
    let total = source.page_count();
    if total == 0 {
        return Err(SplitError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }

    let limit = effective_limit(total, page_limit);
    info!(
        "Splitting {} of {} pages from {}",
        limit,
        total,
        pdf_path.display()
    );

    let mut artifacts = Vec::with_capacity(limit);
    for page_number in 1..=limit {
        if cancel.load(Ordering::SeqCst) || janitor.is_closed() {
            debug!("Split cancelled before page {}", page_number);
            return Err(SplitError::Cancelled { page: page_number });
        }
        let temp = tempfile::Builder::new()
            .prefix(&format!("page-{page_number:04}-"))
            .suffix(".pdf")
            .tempfile_in(scratch_dir)
            .map_err(|e| SplitError::PageExtractionFailed {
                page: page_number,
                detail: format!("temp file: {e}"),
            })?
            .into_temp_path();
        let path = janitor
            .track(temp)
            .ok_or(SplitError::Cancelled { page: page_number })?;

        source.extract_page(page_number, &path)?;
        debug!("Extracted page {} → {}", page_number, path.display());

        artifacts.push(PageArtifact { page_number, path });
    }

    Ok(artifacts)
}

/// Result of an async split: the artifacts plus the source page count.
#[derive(Debug, Clone)]
pub struct SplitOutput {
    pub total_pages: usize,
    pub artifacts: Vec<PageArtifact>,
}

/// Start [`split`] on the blocking pool.
///
/// Dropping the handle does not stop the thread. To abandon a split, set
/// `cancel` and await the handle: the page in progress is finished and
/// tracked, no further page is started.
pub fn spawn_split(
    backend: Arc<dyn PdfBackend>,
    pdf_path: PathBuf,
    page_limit: Option<usize>,
    scratch_dir: PathBuf,
    janitor: Arc<ResourceJanitor>,
    cancel: Arc<AtomicBool>,
) -> JoinHandle<Result<SplitOutput, SplitError>> {
    tokio::task::spawn_blocking(move || {
        let source = backend.open(&pdf_path)?;
        let total_pages = source.page_count();
        let artifacts = split_source(
            &*source,
            &pdf_path,
            page_limit,
            &scratch_dir,
            &janitor,
            &cancel,
        )?;
        Ok(SplitOutput {
            total_pages,
            artifacts,
        })
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use tempfile::TempDir;

    /// Write an `n`-page PDF whose page `i` shows the text "Page i".
    pub(crate) fn write_pdf(path: &Path, n: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(n);
        for i in 1..=n {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {i}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let media_box: Vec<Object> = vec![0.into(), 0.into(), 595.into(), 842.into()];
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => media_box,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => n as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn fixture(n: usize) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("source.pdf");
        write_pdf(&path, n);
        (dir, path)
    }

    #[test]
    fn effective_limit_takes_the_smaller_value() {
        assert_eq!(effective_limit(7, Some(5)), 5);
        assert_eq!(effective_limit(3, Some(5)), 3);
        assert_eq!(effective_limit(7, None), 7);
        assert_eq!(effective_limit(7, Some(0)), 0);
    }

    #[test]
    fn splits_every_page_without_a_cap() {
        let (_dir, src) = fixture(4);
        let scratch = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();

        let artifacts = split(&LopdfBackend, &src, None, scratch.path(), &janitor).unwrap();

        let numbers: Vec<usize> = artifacts.iter().map(|a| a.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(janitor.tracked_count(), 4);
        for artifact in &artifacts {
            let page = Document::load(&artifact.path).unwrap();
            assert_eq!(page.get_pages().len(), 1, "page {}", artifact.page_number);
        }
    }

    #[test]
    fn cap_limits_the_split() {
        let (_dir, src) = fixture(7);
        let scratch = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();

        let artifacts = split(&LopdfBackend, &src, Some(5), scratch.path(), &janitor).unwrap();

        let numbers: Vec<usize> = artifacts.iter().map(|a| a.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 5);
    }

    #[test]
    fn extracted_page_keeps_its_own_content() {
        let (_dir, src) = fixture(3);
        let scratch = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();

        let artifacts = split(&LopdfBackend, &src, None, scratch.path(), &janitor).unwrap();
        let page = Document::load(&artifacts[1].path).unwrap();
        let text = page.extract_text(&[1]).unwrap();
        assert!(text.contains("Page 2"), "got: {text:?}");
    }

    #[test]
    fn empty_document_is_reported() {
        let (_dir, src) = fixture(0);
        let scratch = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();

        let err = split(&LopdfBackend, &src, None, scratch.path(), &janitor).unwrap_err();
        assert!(matches!(err, SplitError::EmptyDocument { .. }));
        assert_eq!(janitor.tracked_count(), 0);
    }

    #[test]
    fn garbage_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("junk.pdf");
        std::fs::write(&src, b"%PDF-1.5 this is not a pdf").unwrap();
        let janitor = ResourceJanitor::new();

        let err = split(&LopdfBackend, &src, None, dir.path(), &janitor).unwrap_err();
        assert!(matches!(err, SplitError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn spawned_split_reports_total_and_capped_artifacts() {
        let (_dir, src) = fixture(7);
        let scratch = TempDir::new().unwrap();
        let janitor = Arc::new(ResourceJanitor::new());

        let out = spawn_split(
            Arc::new(LopdfBackend),
            src,
            Some(5),
            scratch.path().to_path_buf(),
            Arc::clone(&janitor),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(out.total_pages, 7);
        assert_eq!(out.artifacts.len(), 5);
        janitor.release_all();
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cancelled_split_creates_no_files() {
        let (_dir, src) = fixture(3);
        let scratch = TempDir::new().unwrap();
        let janitor = Arc::new(ResourceJanitor::new());

        let err = spawn_split(
            Arc::new(LopdfBackend),
            src,
            None,
            scratch.path().to_path_buf(),
            Arc::clone(&janitor),
            Arc::new(AtomicBool::new(true)),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert_eq!(err, SplitError::Cancelled { page: 1 });
        assert_eq!(janitor.tracked_count(), 0);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn closed_janitor_stops_the_split() {
        let (_dir, src) = fixture(3);
        let scratch = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();
        janitor.release_all();

        let err = split(&LopdfBackend, &src, None, scratch.path(), &janitor).unwrap_err();
        assert_eq!(err, SplitError::Cancelled { page: 1 });
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
