//! Adapter over `edgequake_llm::LLMProvider`.
//!
//! Lets the batch use any provider the `edgequake-llm` factory knows
//! (OpenAI, Anthropic, Gemini, Azure, Mistral, …) with that provider's own
//! credential variables (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …). The
//! endpoint URL and `API_KEY_FOR_OCR` are not used on this path.
//!
//! The provider has no per-call timeout of its own here, so every call is
//! wrapped in `tokio::time::timeout`.

use super::{PageImage, PageReformatter, PageTranscriber, PageTranslator};
use crate::config::BatchConfig;
use crate::error::{Img2MdError, PageError};
use crate::prompts::{
    reformat_user_prompt, translate_system_prompt, translate_user_prompt, REFORMAT_SYSTEM_PROMPT,
    TRANSCRIBE_SYSTEM_PROMPT, TRANSCRIBE_USER_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A vision-capable `LLMProvider` plus the sampling options for one stage.
#[derive(Clone)]
pub struct LlmProviderClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: Option<usize>,
    timeout_secs: u64,
    system_prompt: String,
}

impl LlmProviderClient {
    /// Wrap an already-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &BatchConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| TRANSCRIBE_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Create the named provider with `model` through [`ProviderFactory`].
    pub fn from_factory(
        provider_name: &str,
        model: &str,
        config: &BatchConfig,
    ) -> Result<Self, Img2MdError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            Img2MdError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, config))
    }

    async fn chat(
        &self,
        system: &str,
        user_text: &str,
        image: &PageImage,
    ) -> Result<String, PageError> {
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user_with_images(user_text, vec![image_data(image)]),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&options));
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), call).await {
            Err(_) => Err(PageError::Timeout {
                secs: self.timeout_secs,
            }),
            Ok(Err(e)) => Err(PageError::ApiError {
                detail: e.to_string(),
            }),
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    image.file_name, response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content.trim().to_string())
            }
        }
    }
}

/// Encode the page for the provider; `detail: "high"` keeps fine print legible.
fn image_data(image: &PageImage) -> ImageData {
    ImageData::new(image.to_base64(), image.mime_type).with_detail("high")
}

#[async_trait]
impl PageTranscriber for LlmProviderClient {
    async fn transcribe(&self, image: &PageImage) -> Result<String, PageError> {
        self.chat(&self.system_prompt, TRANSCRIBE_USER_PROMPT, image)
            .await
    }
}

#[async_trait]
impl PageReformatter for LlmProviderClient {
    async fn reformat(&self, text: &str, image: &PageImage) -> Result<String, PageError> {
        self.chat(REFORMAT_SYSTEM_PROMPT, &reformat_user_prompt(text), image)
            .await
            .map_err(PageError::into_reformat)
    }
}

#[async_trait]
impl PageTranslator for LlmProviderClient {
    async fn translate(
        &self,
        markdown: &str,
        target_language: &str,
        image: &PageImage,
    ) -> Result<String, PageError> {
        self.chat(
            &translate_system_prompt(target_language),
            &translate_user_prompt(markdown),
            image,
        )
        .await
        .map_err(PageError::into_translate)
    }
}
