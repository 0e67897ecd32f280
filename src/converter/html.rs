//! HTML pages rendered to Markdown-flavoured text with `html2text`.

use super::tidy::tidy_markdown;
use super::FormatConverter;
use crate::error::ConverterError;
use crate::platform::ObjectContent;
use async_trait::async_trait;

const HTML_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Wrap width handed to the renderer. Long enough that ordinary paragraphs
/// stay on one line.
const WRAP_WIDTH: usize = 120;

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlConverter;

#[async_trait]
impl FormatConverter for HtmlConverter {
    fn supports(&self, mime_type: &str) -> bool {
        HTML_TYPES.contains(&mime_type)
    }

    async fn convert(
        &self,
        content: ObjectContent,
        _mime_type: &str,
    ) -> Result<String, ConverterError> {
        let bytes = content.read_to_end().await?;
        let rendered = html2text::from_read(bytes.as_slice(), WRAP_WIDTH);
        Ok(tidy_markdown(&rendered))
    }
}
