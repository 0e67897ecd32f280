//! Format converters: bytes plus a declared media type in, Markdown out.
//!
//! The job only sees one [`FormatConverter`]. In practice that is a
//! [`ConverterRegistry`], which normalises the media type and hands the
//! content to the first registered converter that claims it:
//!
//! ```text
//! text/plain, text/markdown, application/json ──▶ text::TextConverter
//! text/html, application/xhtml+xml             ──▶ html::HtmlConverter
//! text/csv, text/tab-separated-values          ──▶ table::TableConverter
//! application/pdf                              ──▶ vision::VisionPdfConverter   (feature "vision")
//!                                                  or pdf_text::PdfTextConverter
//! anything else                                ──▶ ConverterError::UnsupportedFormat
//! ```
//!
//! Only one PDF converter is registered: the vision converter when a model
//! provider is configured, local text extraction otherwise.
//!
//! Converters take the [`ObjectContent`] by value and must not hand it back,
//! so the source stream is released by the time `convert` returns, whatever
//! the outcome.

pub mod html;
pub mod pdf_text;
pub mod table;
pub mod text;
pub mod tidy;
#[cfg(feature = "vision")]
pub mod vision;

use crate::error::ConverterError;
use crate::platform::ObjectContent;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Turns a document's bytes into Markdown text.
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Whether this converter handles `mime_type` (already normalised:
    /// lowercase, no parameters).
    fn supports(&self, mime_type: &str) -> bool;

    /// Convert the content. Deterministic for the same bytes; callers do not retry.
    async fn convert(
        &self,
        content: ObjectContent,
        mime_type: &str,
    ) -> Result<String, ConverterError>;
}

/// Lowercase the media type and strip parameters such as `; charset=utf-8`.
pub fn normalise_mime_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Dispatches to the first registered converter supporting the media type.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn FormatConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the converters that need no configuration. No PDF
    /// converter is included; register one of the two explicitly.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(text::TextConverter)
            .register(html::HtmlConverter)
            .register(table::TableConverter)
    }

    pub fn register(mut self, converter: impl FormatConverter + 'static) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    fn find(&self, mime_type: &str) -> Option<&Arc<dyn FormatConverter>> {
        self.converters.iter().find(|c| c.supports(mime_type))
    }
}

#[async_trait]
impl FormatConverter for ConverterRegistry {
    fn supports(&self, mime_type: &str) -> bool {
        self.find(&normalise_mime_type(mime_type)).is_some()
    }

    async fn convert(
        &self,
        content: ObjectContent,
        mime_type: &str,
    ) -> Result<String, ConverterError> {
        let mime = normalise_mime_type(mime_type);
        let converter = self
            .find(&mime)
            .ok_or_else(|| ConverterError::UnsupportedFormat {
                mime_type: mime.clone(),
            })?;
        debug!("dispatching {} to registered converter", mime);
        converter.convert(content, &mime).await
    }
}
