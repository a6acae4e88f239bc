//! Remote extraction: send a page bitmap to a vision language model.
//!
//! ## Message layout
//!
//! 1. **System message**: the extraction instruction (or a caller override)
//! 2. **User message**: the page PNG as a base64 image attachment, empty text
//!
//! ## Retry strategy
//!
//! HTTP 429 / 503 from LLM APIs are transient. Each attempt is bounded by
//! `api_timeout_secs` and failed attempts back off exponentially
//! (`retry_backoff_ms * 2^(attempt-1)`): with 500 ms and 3 retries that is
//! 500 ms → 1 s → 2 s. When every attempt fails the page gets a
//! [`PageError`] and the document carries on.

use super::{encode, postprocess};
use crate::config::ExtractionConfig;
use crate::error::{PageError, Pdf2HandError};
use crate::prompts::extraction_instruction;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Vision-model text extractor.
#[derive(Clone)]
pub struct RemoteExtractor {
    provider: Arc<dyn LLMProvider>,
    instruction: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl RemoteExtractor {
    /// Wrap an already-resolved provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            instruction: extraction_instruction(config.instruction.as_deref()).to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve the provider from `config` and the environment.
    ///
    /// Missing credentials surface here, before any page is processed.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2HandError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    /// Extract the text of one page. `page` is 1-based.
    pub async fn extract_page(&self, page: usize, image: &DynamicImage) -> Result<String, PageError> {
        let start = Instant::now();
        let image_data = encode::encode_page(image).map_err(|e| PageError::EncodeFailed {
            page,
            detail: e.to_string(),
        })?;

        let messages = vec![
            ChatMessage::system(self.instruction.as_str()),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = self.options();

        let mut last_err: Option<String> = None;
        let mut timeouts = 0u32;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&options));
            match timeout(Duration::from_secs(self.api_timeout_secs), call).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(postprocess::clean_text(&response.content));
                }
                Ok(Err(e)) => {
                    warn!("Page {}: attempt {} failed: {}", page, attempt + 1, e);
                    last_err = Some(e.to_string());
                }
                Err(_) => {
                    warn!(
                        "Page {}: attempt {} timed out after {}s",
                        page,
                        attempt + 1,
                        self.api_timeout_secs
                    );
                    timeouts += 1;
                }
            }
        }

        if timeouts > self.max_retries {
            return Err(PageError::Timeout {
                page,
                secs: self.api_timeout_secs,
            });
        }
        Err(PageError::LlmFailed {
            page,
            retries: self.max_retries.min(u8::MAX as u32) as u8,
            detail: last_err.unwrap_or_else(|| "request timed out".to_string()),
        })
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Delay before retry `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2HandError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2HandError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Auto-detection** over every known API key variable.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2HandError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2HandError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY or ANTHROPIC_API_KEY, pass --provider, \
                or use --strategy local.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
