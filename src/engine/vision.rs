//! OCR engine: rasterise the page, ask a vision LLM for Markdown.
//!
//! ## Provider resolution
//!
//! Resolved once in [`PageConverter::prepare`], most specific first:
//! 1. a pre-built provider (`VisionConfig::provider`)
//! 2. a named provider and model (`VisionConfig::provider_name`)
//! 3. auto-detection from API key variables (`ProviderFactory::from_env`)
//!
//! Failure at this point means the engine is unavailable for the whole run.
//!
//! pdfium is bound in the same step, once per converter, and every page is
//! rendered through that instance. Share one converter across runs.
//!
//! ## Retries
//!
//! Off by default. With `max_retries > 0` a failed provider call is retried
//! after `retry_backoff_ms * 2^(attempt-1)`.

use super::cleanup::clean_markdown;
use super::render::{bind_pdfium, encode_png, render_first_page};
use crate::config::VisionConfig;
use crate::error::{ConversionError, EngineError};
use crate::pipeline::dispatch::PageConverter;
use crate::pipeline::split::PageArtifact;
use crate::prompts::system_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use pdfium_render::prelude::Pdfium;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// [`PageConverter`] backed by pdfium rendering and a vision LLM.
pub struct VisionConverter {
    config: VisionConfig,
    prompt: String,
    pdfium: OnceCell<Arc<Pdfium>>,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl std::fmt::Debug for VisionConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConverter")
            .field("config", &self.config)
            .field("pdfium_bound", &self.pdfium.initialized())
            .field("prepared", &self.provider.initialized())
            .finish()
    }
}

impl VisionConverter {
    pub fn new(config: VisionConfig) -> Self {
        let prompt = system_prompt(&config);
        Self {
            config,
            prompt,
            pdfium: OnceCell::new(),
            provider: OnceCell::new(),
        }
    }

    fn unavailable(&self, detail: impl Into<String>) -> EngineError {
        EngineError {
            engine: self.name().to_string(),
            detail: detail.into(),
        }
    }

    fn resolve_provider(&self) -> Result<Arc<dyn LLMProvider>, EngineError> {
        if let Some(ref provider) = self.config.provider {
            return Ok(Arc::clone(provider));
        }

        if let Some(ref name) = self.config.provider_name {
            let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return ProviderFactory::create_llm_provider(name, model)
                .map_err(|e| self.unavailable(format!("provider '{name}': {e}")));
        }

        let (provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
            self.unavailable(format!(
                "no LLM provider detected; set OPENAI_API_KEY or ANTHROPIC_API_KEY, or name a provider ({e})"
            ))
        })?;
        Ok(provider)
    }

    fn messages(&self, image: ImageData) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user_with_images("", vec![image]),
        ]
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        }
    }

    /// Delay before retry `attempt` (1-based), saturating instead of
    /// overflowing for large attempt counts.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }

    async fn call_with_retries(
        &self,
        provider: &Arc<dyn LLMProvider>,
        page_number: usize,
        image: ImageData,
    ) -> Result<String, ConversionError> {
        let messages = self.messages(image);
        let options = self.options();
        let start = Instant::now();
        let mut last_err = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.backoff(attempt);
                warn!(
                    "Page {}: retry {}/{} after {:?}",
                    page_number, attempt, self.config.max_retries, backoff
                );
                sleep(backoff).await;
            }

            match provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page_number,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    warn!("Page {}: attempt {} failed: {}", page_number, attempt + 1, e);
                    last_err = e.to_string();
                }
            }
        }

        Err(ConversionError::Rejected(format!(
            "vision model failed after {} attempt(s): {}",
            self.config.max_retries.saturating_add(1),
            last_err
        )))
    }
}

#[async_trait]
impl PageConverter for VisionConverter {
    fn name(&self) -> &str {
        "vision"
    }

    async fn prepare(&self) -> Result<(), EngineError> {
        self.pdfium
            .get_or_try_init(|| async {
                let library = self.config.pdfium_library.clone();
                tokio::task::spawn_blocking(move || bind_pdfium(library.as_deref()))
                    .await
                    .map_err(|e| self.unavailable(format!("pdfium bind panicked: {e}")))?
                    .map(Arc::new)
                    .map_err(|e| self.unavailable(format!("pdfium library not found: {e}")))
            })
            .await?;

        self.provider
            .get_or_try_init(|| async { self.resolve_provider() })
            .await?;
        info!(
            "Vision engine ready: provider={} model={}",
            self.config.provider_name.as_deref().unwrap_or("auto"),
            self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
        );
        Ok(())
    }

    async fn convert(&self, artifact: &PageArtifact) -> Result<String, ConversionError> {
        let (Some(pdfium), Some(provider)) = (self.pdfium.get(), self.provider.get()) else {
            return Err(ConversionError::Rejected("engine not prepared".into()));
        };

        let pdfium = Arc::clone(pdfium);
        let path = artifact.path.clone();
        let (dpi, max_pixels) = (self.config.dpi, self.config.max_rendered_pixels);
        let image = tokio::task::spawn_blocking(move || {
            let img = render_first_page(&pdfium, &path, dpi, max_pixels)?;
            encode_png(&img)
        })
        .await
        .map_err(|e| ConversionError::Panicked(format!("render task: {e}")))??;

        let raw = self
            .call_with_retries(provider, artifact.page_number, image)
            .await?;
        Ok(clean_markdown(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn options_follow_the_config() {
        let converter = VisionConverter::new(
            VisionConfig::builder()
                .temperature(0.3)
                .max_tokens(1024)
                .build()
                .unwrap(),
        );
        let opts = converter.options();
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn prompt_carries_the_language_hint() {
        let converter = VisionConverter::new(
            VisionConfig::builder().languages(["es", "en"]).build().unwrap(),
        );
        assert!(converter.prompt.contains("`es`, `en`"));
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let converter = VisionConverter::new(
            VisionConfig::builder()
                .retry_backoff_ms(500)
                .max_retries(u32::MAX)
                .build()
                .unwrap(),
        );
        assert_eq!(converter.backoff(1), Duration::from_millis(500));
        assert_eq!(converter.backoff(3), Duration::from_millis(2000));
        assert_eq!(converter.backoff(64), Duration::from_millis(u64::MAX));
        assert_eq!(converter.backoff(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn convert_before_prepare_is_a_page_failure() {
        let converter = VisionConverter::new(VisionConfig::default());
        let artifact = PageArtifact {
            page_number: 1,
            path: PathBuf::from("/nonexistent/page.pdf"),
        };
        let err = converter.convert(&artifact).await.unwrap_err();
        assert_eq!(err, ConversionError::Rejected("engine not prepared".into()));
    }

    #[tokio::test]
    async fn prepare_without_pdfium_is_engine_unavailable() {
        let converter = VisionConverter::new(
            VisionConfig::builder()
                .pdfium_library("/nonexistent/libpdfium.so")
                .build()
                .unwrap(),
        );
        let err = converter.prepare().await.unwrap_err();
        assert_eq!(err.engine, "vision");
        assert!(err.detail.contains("pdfium"));
        assert!(!converter.pdfium.initialized());
    }

    /// Needs a real library: `PDFIUM_LIB_PATH=/path/to/libpdfium.so`.
    #[tokio::test]
    async fn pdfium_is_bound_once_and_shared() {
        let Ok(library) = std::env::var("PDFIUM_LIB_PATH") else {
            println!("SKIP: set PDFIUM_LIB_PATH to run");
            return;
        };
        let converter = VisionConverter::new(
            VisionConfig::builder()
                .pdfium_library(library)
                .provider(Arc::new(edgequake_llm::MockProvider::new()))
                .build()
                .unwrap(),
        );

        converter.prepare().await.unwrap();
        let first = Arc::clone(converter.pdfium.get().unwrap());
        converter.prepare().await.unwrap();
        assert!(Arc::ptr_eq(&first, converter.pdfium.get().unwrap()));
    }
}
