//! Native Ollama client (`POST /api/generate`).
//!
//! Ollama's generate endpoint takes a single prompt plus a list of bare
//! base64 images (no data-URI prefix) and answers with `{"response": …}`.
//! Errors come back as `{"error": "…"}`, sometimes with HTTP 200.

use super::{
    error_message, request_error, truncate_detail, PageImage, PageReformatter, PageTranscriber,
    PageTranslator,
};
use crate::config::BatchConfig;
use crate::error::PageError;
use crate::prompts::{
    reformat_user_prompt, translate_system_prompt, translate_user_prompt, REFORMAT_SYSTEM_PROMPT,
    TRANSCRIBE_SYSTEM_PROMPT, TRANSCRIBE_USER_PROMPT,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

/// One model on one Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: Option<usize>,
    timeout_secs: u64,
    system_prompt: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, config: &BatchConfig, model: &str) -> Self {
        Self {
            http,
            url: config.endpoint().to_string(),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| TRANSCRIBE_SYSTEM_PROMPT.to_string()),
        }
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        image: &PageImage,
    ) -> Result<String, PageError> {
        let body = build_generate_request(
            &self.model,
            system,
            prompt,
            image,
            self.temperature,
            self.max_tokens,
        );

        let mut request = self.http.post(&self.url).json(&body);
        // Ollama itself ignores auth, but reverse proxies in front of it often don't.
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let start = Instant::now();
        let map_err = |e| request_error(e, self.timeout_secs);
        let response = request.send().await.map_err(map_err)?;
        let status = response.status();
        let text = response.text().await.map_err(map_err)?;
        debug!(
            "{} → HTTP {} ({} bytes, {:?})",
            image.file_name,
            status.as_u16(),
            text.len(),
            start.elapsed()
        );

        let parsed = serde_json::from_str::<Value>(&text);
        if !status.is_success() {
            let detail = parsed
                .ok()
                .and_then(|v| v.get("error").map(error_message))
                .unwrap_or_else(|| truncate_detail(&text));
            return Err(PageError::HttpStatus {
                status: status.as_u16(),
                detail,
            });
        }

        let value = parsed.map_err(|e| PageError::MalformedResponse {
            detail: format!("invalid JSON ({e}): {}", truncate_detail(&text)),
        })?;
        parse_generate_response(&value)
    }
}

#[async_trait]
impl PageTranscriber for OllamaClient {
    async fn transcribe(&self, image: &PageImage) -> Result<String, PageError> {
        self.generate(&self.system_prompt, TRANSCRIBE_USER_PROMPT, image)
            .await
    }
}

#[async_trait]
impl PageReformatter for OllamaClient {
    async fn reformat(&self, text: &str, image: &PageImage) -> Result<String, PageError> {
        self.generate(REFORMAT_SYSTEM_PROMPT, &reformat_user_prompt(text), image)
            .await
            .map_err(PageError::into_reformat)
    }
}

#[async_trait]
impl PageTranslator for OllamaClient {
    async fn translate(
        &self,
        markdown: &str,
        target_language: &str,
        image: &PageImage,
    ) -> Result<String, PageError> {
        self.generate(
            &translate_system_prompt(target_language),
            &translate_user_prompt(markdown),
            image,
        )
        .await
        .map_err(PageError::into_translate)
    }
}

/// Build the JSON body of a non-streaming `/api/generate` request.
pub fn build_generate_request(
    model: &str,
    system: &str,
    prompt: &str,
    image: &PageImage,
    temperature: f32,
    max_tokens: Option<usize>,
) -> Value {
    let mut options = json!({ "temperature": temperature });
    if let Some(n) = max_tokens {
        options["num_predict"] = json!(n);
    }
    json!({
        "model": model,
        "system": system,
        "prompt": prompt,
        "images": [image.to_base64()],
        "stream": false,
        "options": options,
    })
}

/// Extract the generated text, treating an `error` field as a failure.
pub fn parse_generate_response(body: &Value) -> Result<String, PageError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        return Err(PageError::ApiError {
            detail: error_message(err),
        });
    }
    body.get("response")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| PageError::MalformedResponse {
            detail: "missing 'response' field".into(),
        })
}
