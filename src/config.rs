//! Configuration types for document ingestion.
//!
//! Two structs, two owners:
//!
//! * [`IngestConfig`] drives the pipeline: page cap, dispatch concurrency,
//!   timeouts, storage key layout, scratch directory.
//! * [`VisionConfig`] drives the built-in [`crate::engine::VisionConverter`]
//!   only. Pipelines using another [`crate::PageConverter`] never touch it.
//!
//! Both are built once at process start and shared read-only. Nothing in the
//! library reads environment variables; the CLI maps env vars onto builders.

use crate::error::IngestError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Pages processed per document in testing mode.
pub const TESTING_PAGE_CAP: usize = 5;

/// Default storage key prefix; documents land at `parsed/{doc_id}.json`.
pub const DEFAULT_KEY_PREFIX: &str = "parsed";

/// Pipeline configuration.
///
/// # Example
/// ```rust
/// use edgequake_pdfingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .concurrency(4)
///     .testing(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_limit, Some(5));
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Concurrent page conversions per document. `1` is fully sequential. Default: 4.
    pub concurrency: usize,

    /// Maximum pages split per document. `None` processes every page.
    ///
    /// Applied at split time: pages beyond the cap are never extracted nor
    /// dispatched.
    pub page_limit: Option<usize>,

    /// Storage key prefix. Default: `parsed`.
    pub key_prefix: String,

    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-page conversion timeout. Default: none.
    pub convert_timeout: Option<Duration>,

    /// Budget for splitting plus dispatch of one document. Default: none.
    ///
    /// When it elapses in-flight conversions are dropped, temp files are
    /// released and nothing is persisted.
    pub run_timeout: Option<Duration>,

    /// Directory for downloaded sources and page artifacts. Default: OS temp dir.
    pub scratch_dir: Option<PathBuf>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_limit: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            download_timeout_secs: 120,
            convert_timeout: None,
            run_timeout: None,
            scratch_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("concurrency", &self.concurrency)
            .field("page_limit", &self.page_limit)
            .field("key_prefix", &self.key_prefix)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("convert_timeout", &self.convert_timeout)
            .field("run_timeout", &self.run_timeout)
            .field("scratch_dir", &self.scratch_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Storage key for a document: `{key_prefix}/{doc_id}.json`.
    pub fn storage_key(&self, doc_id: &str) -> String {
        let prefix = self.key_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{doc_id}.json")
        } else {
            format!("{prefix}/{doc_id}.json")
        }
    }

    /// Directory where temp files for a run are created.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_limit(mut self, limit: usize) -> Self {
        self.config.page_limit = Some(limit);
        self
    }

    /// Testing mode caps every document at [`TESTING_PAGE_CAP`] pages.
    /// Turning it off removes any cap.
    pub fn testing(mut self, on: bool) -> Self {
        self.config.page_limit = on.then_some(TESTING_PAGE_CAP);
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn convert_timeout(mut self, timeout: Duration) -> Self {
        self.config.convert_timeout = Some(timeout);
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.config.run_timeout = Some(timeout);
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(IngestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.download_timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "Download timeout must be ≥ 1s".into(),
            ));
        }
        if c.convert_timeout.is_some_and(|t| t.is_zero()) {
            return Err(IngestError::InvalidConfig(
                "Conversion timeout must be non-zero".into(),
            ));
        }
        if c.key_prefix.contains("..") {
            return Err(IngestError::InvalidConfig(format!(
                "Key prefix must not contain '..', got '{}'",
                c.key_prefix
            )));
        }
        Ok(self.config)
    }
}

/// Configuration for the built-in vision conversion engine.
#[derive(Clone)]
pub struct VisionConfig {
    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest rendered edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4096.
    pub max_tokens: usize,

    /// Engine-level retries on a transient provider error. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Languages the page text is expected in (ISO 639-1). Default: `["es"]`.
    pub languages: Vec<String>,

    /// Explicit path to a pdfium shared library. If None, binds to the
    /// system library.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            system_prompt: None,
            languages: vec!["es".to_string()],
            pdfium_library: None,
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("languages", &self.languages)
            .field("pdfium_library", &self.pdfium_library)
            .finish()
    }
}

impl VisionConfig {
    pub fn builder() -> VisionConfigBuilder {
        VisionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`VisionConfig`].
#[derive(Debug)]
pub struct VisionConfigBuilder {
    config: VisionConfig,
}

impl VisionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Set the expected page languages. Blank entries are dropped.
    pub fn languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.languages = langs
            .into_iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn build(self) -> Result<VisionConfig, IngestError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(IngestError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(IngestError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
