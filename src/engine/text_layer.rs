//! OCR-off engine: read the page's embedded text layer with lopdf.
//!
//! No model and no native library. Scanned pages carry no text layer and
//! fail with [`ConversionError::Rejected`], so they show up in the report
//! instead of as empty records.

use super::cleanup::clean_markdown;
use crate::error::ConversionError;
use crate::pipeline::dispatch::PageConverter;
use crate::pipeline::split::PageArtifact;
use async_trait::async_trait;
use lopdf::Document;
use std::path::Path;

/// [`PageConverter`] that returns the page's extractable text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLayerConverter;

impl TextLayerConverter {
    pub fn new() -> Self {
        Self
    }
}

fn extract_text_layer(path: &Path) -> Result<String, ConversionError> {
    let document = Document::load(path)
        .map_err(|e| ConversionError::Rejected(format!("unreadable page: {e}")))?;
    let text = document
        .extract_text(&[1])
        .map_err(|e| ConversionError::Rejected(format!("text extraction failed: {e}")))?;

    let cleaned = clean_markdown(&text);
    if cleaned.is_empty() {
        return Err(ConversionError::Rejected(
            "no text layer (scanned page?)".into(),
        ));
    }
    Ok(cleaned)
}

#[async_trait]
impl PageConverter for TextLayerConverter {
    fn name(&self) -> &str {
        "text-layer"
    }

    async fn convert(&self, artifact: &PageArtifact) -> Result<String, ConversionError> {
        let path = artifact.path.clone();
        tokio::task::spawn_blocking(move || extract_text_layer(&path))
            .await
            .map_err(|e| ConversionError::Panicked(format!("text extraction task: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::janitor::ResourceJanitor;
    use crate::pipeline::split::{split, tests::write_pdf, LopdfBackend};
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_each_page_text() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("doc.pdf");
        write_pdf(&src, 3);
        let janitor = ResourceJanitor::new();
        let artifacts = split(&LopdfBackend, &src, None, dir.path(), &janitor).unwrap();

        let converter = TextLayerConverter::new();
        let text = converter.convert(&artifacts[2]).await.unwrap();
        assert!(text.contains("Page 3"), "got: {text:?}");
    }

    #[tokio::test]
    async fn unreadable_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let artifact = PageArtifact {
            page_number: 1,
            path,
        };
        let err = TextLayerConverter.convert(&artifact).await.unwrap_err();
        assert!(matches!(err, ConversionError::Rejected(_)));
    }
}
