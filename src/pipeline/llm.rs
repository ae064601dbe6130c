//! LLM interaction: build chat messages and call the provider.
//!
//! [`LlmBackend`] adapts any `edgequake_llm` provider to
//! [`ClassifierBackend`]. Prompt text lives in
//! [`crate::prompts`], and retry, timeout and parsing policy live in
//! [`crate::pipeline::classify`].

use crate::config::PipelineConfig;
use crate::error::BackendError;
use crate::pipeline::classify::{ClassificationRequest, ClassifierBackend, TokenUsage};
use crate::prompts::{classification_user_prompt, DEFAULT_SYSTEM_PROMPT, STRICT_REFORMAT_SUFFIX};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Classifier backend that talks to a chat-completion provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    upgrade_category: String,
    temperature: f32,
    max_tokens: usize,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            upgrade_category: config.upgrade_category.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    /// System message, with the reformat rules appended on a strict retry.
    fn system_message(&self, strict: bool) -> String {
        if strict {
            format!("{}{}", self.system_prompt, STRICT_REFORMAT_SUFFIX)
        } else {
            self.system_prompt.clone()
        }
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClassifierBackend for LlmBackend {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, BackendError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(self.system_message(request.strict)),
            ChatMessage::user(classification_user_prompt(request, &self.upgrade_category)),
        ];
        let options = self.build_options();

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "'{}': {} input tokens, {} output tokens, {:?}",
                    request.name,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                self.input_tokens
                    .fetch_add(response.prompt_tokens as u64, Ordering::Relaxed);
                self.output_tokens
                    .fetch_add(response.completion_tokens as u64, Ordering::Relaxed);
                Ok(response.content)
            }
            Err(e) => Err(map_provider_error(&e.to_string())),
        }
    }

    fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

/// Sort a provider error message into the retry classes.
///
/// Providers surface HTTP failures as text, so this goes by the message:
/// auth problems are final, everything else is worth another try.
pub fn map_provider_error(message: &str) -> BackendError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota") {
        BackendError::RateLimited(message.to_string())
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("api key")
        || lower.contains("authentication")
    {
        BackendError::Rejected(message.to_string())
    } else {
        BackendError::Transient(message.to_string())
    }
}
