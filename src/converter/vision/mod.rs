//! PDF → Markdown through a vision language model.
//!
//! ```text
//! bytes ─▶ %PDF check ─▶ render (pdfium, spawn_blocking) ─▶ encode (PNG/base64)
//!       ─▶ page calls (VLM, buffer_unordered) ─▶ tidy ─▶ join in page order
//! ```
//!
//! The converter is built once at startup with a resolved
//! [`LLMProvider`]; each [`FormatConverter::convert`] call renders and
//! transcribes one document. Page calls retry with exponential backoff; a
//! page that still fails fails the whole document unless
//! [`VisionConfig::allow_partial`] is set. Whatever this converter returns
//! is indexed and served for that document from then on.

mod encode;
mod page;
mod prompts;
mod render;

pub use prompts::DEFAULT_SYSTEM_PROMPT;

use super::tidy::tidy_markdown;
use super::FormatConverter;
use crate::error::ConverterError;
use crate::platform::ObjectContent;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const PDF_MIME_TYPE: &str = "application/pdf";

/// Upper bound for [`VisionConfig::max_rendered_pixels`]. Larger pages cost
/// memory without helping the model read them.
pub const MAX_RENDERED_PIXELS: u32 = 16_384;

/// Settings for [`VisionPdfConverter`].
#[derive(Clone)]
pub struct VisionConfig {
    /// Vision model id, e.g. "gpt-4.1-nano". If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name ("openai", "anthropic", "gemini", "ollama", ...).
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Concurrent page calls. Default: 8.
    pub concurrency: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Output token cap per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries per page after the first attempt. Default: 3.
    pub max_retries: u32,

    /// First retry delay; doubles each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Longest edge of a rendered page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Replaces [`DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// pdfium shared library, or a directory holding it. If None, the
    /// system library is used.
    pub pdfium_library_path: Option<PathBuf>,

    /// Skip pages that fail instead of failing the document. Default: false.
    pub allow_partial: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            concurrency: 8,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_rendered_pixels: 2000,
            system_prompt: None,
            pdfium_library_path: None,
            allow_partial: false,
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("concurrency", &self.concurrency)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("allow_partial", &self.allow_partial)
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

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
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

    /// Clamped to `100..=MAX_RENDERED_PIXELS`.
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(100, MAX_RENDERED_PIXELS);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn allow_partial(mut self, v: bool) -> Self {
        self.config.allow_partial = v;
        self
    }

    pub fn build(self) -> Result<VisionConfig, ConverterError> {
        if self.config.max_tokens == 0 {
            return Err(ConverterError::Internal(
                "max_tokens must be at least 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Converts `application/pdf` documents page by page with a vision model.
pub struct VisionPdfConverter {
    config: VisionConfig,
    provider: Arc<dyn LLMProvider>,
}

impl fmt::Debug for VisionPdfConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionPdfConverter")
            .field("config", &self.config)
            .finish()
    }
}

impl VisionPdfConverter {
    /// Resolve the model provider and build the converter.
    pub fn new(config: VisionConfig) -> Result<Self, ConverterError> {
        let provider = resolve_provider(&config)?;
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }
}

#[async_trait]
impl FormatConverter for VisionPdfConverter {
    fn supports(&self, mime_type: &str) -> bool {
        mime_type == PDF_MIME_TYPE
    }

    async fn convert(
        &self,
        content: ObjectContent,
        _mime_type: &str,
    ) -> Result<String, ConverterError> {
        let started = Instant::now();
        let pdf = content.read_to_end().await?;
        if !pdf.starts_with(b"%PDF") {
            return Err(ConverterError::Unreadable {
                format: "PDF".into(),
                detail: format!("missing %PDF header, first bytes {:?}", &pdf[..pdf.len().min(4)]),
            });
        }

        let rendered = render::render_pages(pdf, &self.config).await?;
        let total = rendered.len();
        if total == 0 {
            return Err(ConverterError::EmptyOutput);
        }
        info!("Rendered {} pages in {}ms", total, started.elapsed().as_millis());

        let calls = rendered.into_iter().map(|(idx, image)| {
            let provider = Arc::clone(&self.provider);
            let config = &self.config;
            async move {
                let page_num = idx + 1;
                let text = match encode::encode_page(&image) {
                    Ok(data) => page::transcribe_page(&provider, page_num, data, config).await,
                    Err(e) => Err(format!("image encoding failed: {e}")),
                };
                (page_num, text)
            }
        });
        let mut pages: Vec<(usize, Result<String, String>)> = stream::iter(calls)
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        pages.sort_by_key(|(page_num, _)| *page_num);

        let markdown = assemble(pages, total, self.config.allow_partial)?;
        info!(
            "Transcribed {} pages in {}ms",
            total,
            started.elapsed().as_millis()
        );
        Ok(markdown)
    }
}

/// Join transcribed pages in order, applying the partial-failure policy.
fn assemble(
    pages: Vec<(usize, Result<String, String>)>,
    total: usize,
    allow_partial: bool,
) -> Result<String, ConverterError> {
    let mut failures = Vec::new();
    let mut parts = Vec::new();
    for (page_num, result) in pages {
        match result {
            Ok(text) => parts.push(tidy_markdown(&text)),
            Err(detail) => {
                warn!("Page {} failed: {}", page_num, detail);
                failures.push(format!("page {page_num}: {detail}"));
            }
        }
    }

    if !failures.is_empty() && (!allow_partial || parts.is_empty()) {
        return Err(ConverterError::PagesFailed {
            failed: failures.len(),
            total,
            first_error: failures.swap_remove(0),
        });
    }

    let joined = parts
        .iter()
        .map(|p| p.trim_end())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(format!("{joined}\n"))
}

/// Resolve the model provider, most specific setting first.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is. Tests inject
///    mocks here.
///
/// 2. **Named provider** (`config.provider_name`) with `config.model`, or
///    `gpt-4.1-nano` when no model is set. The factory reads the matching API
///    key (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, ...) from the environment.
///
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`):
///    both must be non-empty. Checked before auto-detection so the deployment's
///    model choice holds even when several API keys are present.
///
/// 4. **OpenAI key** (`OPENAI_API_KEY`): OpenAI with the configured model.
///
/// 5. **Auto-detection** ([`ProviderFactory::from_env`]): first provider with
///    a usable key. Failing that, [`ConverterError::ProviderNotConfigured`],
///    which the binary answers by falling back to local PDF text extraction.
fn resolve_provider(config: &VisionConfig) -> Result<Arc<dyn LLMProvider>, ConverterError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| ConverterError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!("no LLM provider detected from the environment: {e}"),
        })?;
    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ConverterError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ConverterError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(page: usize, text: &str) -> (usize, Result<String, String>) {
        (page, Ok(text.to_string()))
    }

    fn failed(page: usize, detail: &str) -> (usize, Result<String, String>) {
        (page, Err(detail.to_string()))
    }

    #[test]
    fn builder_clamps_values() {
        let c = VisionConfig::builder()
            .concurrency(0)
            .temperature(5.0)
            .max_rendered_pixels(10)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_rendered_pixels, 100);

        let c = VisionConfig::builder()
            .max_rendered_pixels(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(c.max_rendered_pixels, MAX_RENDERED_PIXELS);
        assert!(i32::try_from(c.max_rendered_pixels).is_ok());
    }

    #[test]
    fn named_provider_wins_over_environment() {
        let config = VisionConfig::builder()
            .provider_name("no-such-provider")
            .build()
            .unwrap();
        let err = resolve_provider(&config).err();
        assert!(matches!(
            err,
            Some(ConverterError::ProviderNotConfigured { ref provider, .. })
                if provider == "no-such-provider"
        ));
    }

    #[test]
    fn builder_rejects_zero_max_tokens() {
        assert!(VisionConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn assemble_joins_pages_in_order() {
        let md = assemble(vec![ok(1, "# One\n"), ok(2, "Two")], 2, false).unwrap();
        assert_eq!(md, "# One\n\nTwo\n");
    }

    #[test]
    fn assemble_fails_on_any_page_by_default() {
        let err = assemble(vec![ok(1, "One"), failed(2, "timeout")], 2, false).unwrap_err();
        match err {
            ConverterError::PagesFailed {
                failed,
                total,
                first_error,
            } => {
                assert_eq!((failed, total), (1, 2));
                assert!(first_error.contains("page 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn assemble_skips_failed_pages_when_partial_allowed() {
        let md = assemble(vec![ok(1, "One"), failed(2, "timeout"), ok(3, "Three")], 3, true)
            .unwrap();
        assert_eq!(md, "One\n\nThree\n");
    }

    #[test]
    fn assemble_all_failed_is_error_even_when_partial_allowed() {
        let err = assemble(vec![failed(1, "a"), failed(2, "b")], 2, true).unwrap_err();
        assert!(matches!(err, ConverterError::PagesFailed { failed: 2, .. }));
    }
}
