//! Local PDF text extraction with `pdf-extract`.
//!
//! No model and no layout recovery: the text layer comes out in reading
//! order, with pages separated by blank lines. Scanned PDFs without a text
//! layer produce nothing and fail as [`ConverterError::EmptyOutput`]. Used when
//! no vision model is configured.

use super::tidy::tidy_markdown;
use super::FormatConverter;
use crate::error::ConverterError;
use crate::platform::ObjectContent;
use async_trait::async_trait;
use tracing::debug;

const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextConverter;

#[async_trait]
impl FormatConverter for PdfTextConverter {
    fn supports(&self, mime_type: &str) -> bool {
        mime_type == PDF_MIME_TYPE
    }

    async fn convert(
        &self,
        content: ObjectContent,
        _mime_type: &str,
    ) -> Result<String, ConverterError> {
        let pdf = content.read_to_end().await?;
        if !pdf.starts_with(b"%PDF") {
            return Err(unreadable("missing %PDF header"));
        }

        // pdf-extract is CPU-bound and panics on some malformed files.
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
            .await
            .map_err(|e| unreadable(format!("text extraction aborted: {e}")))?
            .map_err(|e| unreadable(e.to_string()))?;
        debug!("extracted {} chars of PDF text", text.len());

        let markdown = tidy_markdown(&text);
        if markdown.is_empty() {
            return Err(ConverterError::EmptyOutput);
        }
        Ok(markdown)
    }
}

fn unreadable(detail: impl Into<String>) -> ConverterError {
    ConverterError::Unreadable {
        format: "PDF".into(),
        detail: detail.into(),
    }
}
