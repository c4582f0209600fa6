//! Built-in [`crate::PageConverter`] engines.
//!
//! | Engine | OCR | Needs |
//! |---|---|---|
//! | [`VisionConverter`] | yes | pdfium library + vision LLM API key |
//! | [`TextLayerConverter`] | no | nothing |
//!
//! Both pass their output through [`cleanup::clean_markdown`].

pub mod cleanup;
pub mod render;
pub mod text_layer;
pub mod vision;

pub use text_layer::TextLayerConverter;
pub use vision::VisionConverter;

/// Which built-in engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// OCR through a vision LLM.
    #[default]
    Vision,
    /// Embedded text layer only.
    Text,
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vision" | "ocr" => Ok(EngineKind::Vision),
            "text" | "text-layer" => Ok(EngineKind::Text),
            other => Err(format!("unknown engine '{other}' (expected vision or text)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_names() {
        assert_eq!("vision".parse::<EngineKind>(), Ok(EngineKind::Vision));
        assert_eq!("OCR".parse::<EngineKind>(), Ok(EngineKind::Vision));
        assert_eq!(" text ".parse::<EngineKind>(), Ok(EngineKind::Text));
        assert!("docling".parse::<EngineKind>().is_err());
    }
}
