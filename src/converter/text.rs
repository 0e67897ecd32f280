//! Converters for content that is already text.

use super::FormatConverter;
use crate::error::ConverterError;
use crate::platform::ObjectContent;
use async_trait::async_trait;

/// Plain text and Markdown pass through; JSON becomes a fenced code block.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverter;

const TEXT_TYPES: &[&str] = &["text/plain", "text/markdown", "text/x-markdown"];
const JSON_TYPE: &str = "application/json";

#[async_trait]
impl FormatConverter for TextConverter {
    fn supports(&self, mime_type: &str) -> bool {
        mime_type == JSON_TYPE || TEXT_TYPES.contains(&mime_type)
    }

    async fn convert(
        &self,
        content: ObjectContent,
        mime_type: &str,
    ) -> Result<String, ConverterError> {
        let bytes = content.read_to_end().await?;
        let text = String::from_utf8(strip_bom(bytes))?;
        let text = text.replace("\r\n", "\n").replace('\r', "\n");

        if mime_type == JSON_TYPE {
            return json_block(&text);
        }
        Ok(text)
    }
}

fn strip_bom(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes.drain(..3);
    }
    bytes
}

fn json_block(text: &str) -> Result<String, ConverterError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ConverterError::Unreadable {
            format: "JSON".into(),
            detail: e.to_string(),
        })?;
    let pretty = serde_json::to_string_pretty(&value)
        .map_err(|e| ConverterError::Internal(e.to_string()))?;
    Ok(format!("```json\n{pretty}\n```\n"))
}
