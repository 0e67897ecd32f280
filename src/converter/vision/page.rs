//! One page image → one VLM call, with retry.
//!
//! Rate limits and 5xx answers are common under concurrent load, so each
//! page retries with exponential backoff (`retry_backoff_ms * 2^(attempt-1)`):
//! with the defaults the waits are 500 ms, 1 s, 2 s.

use super::prompts::DEFAULT_SYSTEM_PROMPT;
use super::VisionConfig;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Transcribe one page. `Err` carries the last failure message after all
/// retries are exhausted.
pub(super) async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image: ImageData,
    config: &VisionConfig,
) -> Result<String, String> {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    // The image carries the content; the user turn only needs to exist.
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = build_options(config);

    let mut last_err = String::from("no attempt made");
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {:?}",
                    page_num,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Err(e) => {
                last_err = e.to_string();
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, last_err);
            }
        }
    }

    Err(format!(
        "failed after {} retries: {}",
        config.max_retries, last_err
    ))
}

fn build_options(config: &VisionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
