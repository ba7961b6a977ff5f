//! OpenAI-compatible chat-completions client.
//!
//! Works with any server that speaks the `/v1/chat/completions` dialect and
//! accepts `image_url` content parts: OpenAI, vLLM, LM Studio, LiteLLM,
//! Ollama's `/v1` shim, and so on.
//!
//! ## Request layout
//!
//! 1. **System message**: the stage prompt
//! 2. **User message**: a text part followed by the page as a base64 data URI
//!
//! ## Response handling
//!
//! An HTTP 200 is not trusted blindly: some servers report failures as
//! `{"error": …}` with a success status. Those become
//! [`PageError::ApiError`] rather than an empty page.

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

/// One model on one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: Option<usize>,
    timeout_secs: u64,
    system_prompt: String,
}

impl OpenAiCompatibleClient {
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

    async fn chat(
        &self,
        system: &str,
        user_text: &str,
        image: &PageImage,
    ) -> Result<String, PageError> {
        let body = build_chat_request(
            &self.model,
            system,
            user_text,
            image,
            self.temperature,
            self.max_tokens,
        );

        let mut request = self.http.post(&self.url).json(&body);
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
        parse_chat_response(&value)
    }
}

#[async_trait]
impl PageTranscriber for OpenAiCompatibleClient {
    async fn transcribe(&self, image: &PageImage) -> Result<String, PageError> {
        self.chat(&self.system_prompt, TRANSCRIBE_USER_PROMPT, image).await
    }
}

#[async_trait]
impl PageReformatter for OpenAiCompatibleClient {
    async fn reformat(&self, text: &str, image: &PageImage) -> Result<String, PageError> {
        self.chat(REFORMAT_SYSTEM_PROMPT, &reformat_user_prompt(text), image)
            .await
            .map_err(PageError::into_reformat)
    }
}

#[async_trait]
impl PageTranslator for OpenAiCompatibleClient {
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

/// Build the JSON body of a non-streaming chat-completions request.
pub fn build_chat_request(
    model: &str,
    system: &str,
    user_text: &str,
    image: &PageImage,
    temperature: f32,
    max_tokens: Option<usize>,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": user_text },
                    { "type": "image_url", "image_url": { "url": image.data_uri() } },
                ],
            },
        ],
        "temperature": temperature,
        "stream": false,
    });
    if let Some(n) = max_tokens {
        body["max_tokens"] = json!(n);
    }
    body
}

/// Extract the assistant text from a chat-completions response.
///
/// `content` may be a plain string or a list of parts; only `text` and
/// `output_text` parts are kept. A `null` or missing content is an empty
/// answer, not an error.
pub fn parse_chat_response(body: &Value) -> Result<String, PageError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        return Err(PageError::ApiError {
            detail: error_message(err),
        });
    }

    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| PageError::MalformedResponse {
            detail: "missing choices[0].message".into(),
        })?;

    match message.get("content") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Array(parts)) => Ok(parts
            .iter()
            .filter(|p| {
                matches!(
                    p.get("type").and_then(Value::as_str),
                    Some("text") | Some("output_text")
                )
            })
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<String>()
            .trim()
            .to_string()),
        Some(other) => Err(PageError::MalformedResponse {
            detail: format!("unsupported message content: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> PageImage {
        PageImage::from_bytes("page1.png", b"\x89PNG\r\n\x1a\n".to_vec())
    }

    #[test]
    fn request_carries_system_text_and_image() {
        let body = build_chat_request("qwen2.5-vl", "SYS", "USER", &image(), 0.1, Some(2048));
        assert_eq!(body["model"], "qwen2.5-vl");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "SYS");
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "USER");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn request_omits_max_tokens_when_unset() {
        let body = build_chat_request("m", "s", "u", &image(), 0.0, None);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn parses_string_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "  # Hi \n"}}]});
        assert_eq!(parse_chat_response(&body).unwrap(), "# Hi");
    }

    #[test]
    fn parses_content_parts() {
        let body = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "Hello "},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "output_text", "text": "world"}
        ]}}]});
        assert_eq!(parse_chat_response(&body).unwrap(), "Hello world");
    }

    #[test]
    fn null_content_is_empty_text() {
        let body = json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(parse_chat_response(&body).unwrap(), "");
    }

    #[test]
    fn error_object_in_success_body_is_an_error() {
        let body = json!({"error": {"message": "model 'x' not found", "type": "invalid_request_error"}});
        let err = parse_chat_response(&body).unwrap_err();
        assert_eq!(
            err,
            PageError::ApiError {
                detail: "model 'x' not found".into()
            }
        );
    }

    #[test]
    fn error_string_in_success_body_is_an_error() {
        let body = json!({"error": "overloaded", "choices": []});
        assert!(matches!(
            parse_chat_response(&body),
            Err(PageError::ApiError { .. })
        ));
    }

    #[test]
    fn missing_choices_is_malformed() {
        let body = json!({"id": "abc"});
        assert!(matches!(
            parse_chat_response(&body),
            Err(PageError::MalformedResponse { .. })
        ));
        let body = json!({"choices": []});
        assert!(matches!(
            parse_chat_response(&body),
            Err(PageError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn numeric_content_is_malformed() {
        let body = json!({"choices": [{"message": {"content": 42}}]});
        assert!(matches!(
            parse_chat_response(&body),
            Err(PageError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn client_uses_config_prompt_override() {
        let config = BatchConfig::builder()
            .system_prompt("Only digits.")
            .build()
            .unwrap();
        let http = crate::provider::http_client(config.timeout_secs).unwrap();
        let client = OpenAiCompatibleClient::new(http, &config, "m");
        assert_eq!(client.system_prompt, "Only digits.");
        assert_eq!(client.model, "m");
    }

    // ── Over the wire ────────────────────────────────────────────────────

    use crate::provider::canned;
    use std::time::Duration;

    fn client_for(base: &str, timeout_secs: u64) -> OpenAiCompatibleClient {
        let config = BatchConfig::builder()
            .api_url(format!("{base}/v1/chat/completions"))
            .timeout_secs(timeout_secs)
            .build()
            .unwrap();
        OpenAiCompatibleClient::new(canned::http_client(timeout_secs), &config, "vision-model")
    }

    #[tokio::test]
    async fn transcribe_returns_message_content() {
        let base = canned::serve_once(
            200,
            r##"{"choices":[{"message":{"role":"assistant","content":"# Page 1\n"}}]}"##,
        )
        .await;
        let text = client_for(&base, 5).transcribe(&image()).await.unwrap();
        assert_eq!(text, "# Page 1");
    }

    #[tokio::test]
    async fn error_status_carries_api_message() {
        let base = canned::serve_once(
            404,
            r#"{"error":{"message":"model 'vision-model' not found","type":"invalid_request_error"}}"#,
        )
        .await;
        let err = client_for(&base, 5).transcribe(&image()).await.unwrap_err();
        assert_eq!(
            err,
            PageError::HttpStatus {
                status: 404,
                detail: "model 'vision-model' not found".into()
            }
        );
    }

    #[tokio::test]
    async fn error_status_with_plain_body_keeps_the_body() {
        let base = canned::serve_once(502, "upstream unavailable").await;
        let err = client_for(&base, 5).transcribe(&image()).await.unwrap_err();
        assert_eq!(
            err,
            PageError::HttpStatus {
                status: 502,
                detail: "upstream unavailable".into()
            }
        );
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let base = canned::serve_once(200, "<html>proxy login</html>").await;
        let err = client_for(&base, 5).transcribe(&image()).await.unwrap_err();
        assert!(matches!(err, PageError::MalformedResponse { .. }), "got {err:?}");
        assert!(err.to_string().contains("proxy login"));
    }

    #[tokio::test]
    async fn error_object_with_success_status_fails_the_page() {
        let base = canned::serve_once(200, r#"{"error":{"message":"quota exceeded"}}"#).await;
        let err = client_for(&base, 5).transcribe(&image()).await.unwrap_err();
        assert_eq!(
            err,
            PageError::ApiError {
                detail: "quota exceeded".into()
            }
        );
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let base = canned::serve_after(
            Duration::from_secs(5),
            200,
            r#"{"choices":[{"message":{"content":"late"}}]}"#,
        )
        .await;
        let err = client_for(&base, 1).transcribe(&image()).await.unwrap_err();
        assert_eq!(err, PageError::Timeout { secs: 1 });
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let base = canned::closed_port().await;
        let err = client_for(&base, 5).transcribe(&image()).await.unwrap_err();
        assert!(matches!(err, PageError::Transport { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn reformat_failure_is_tagged_with_its_stage() {
        let base = canned::serve_once(500, r#"{"error":"out of memory"}"#).await;
        let err = client_for(&base, 5)
            .reformat("raw text", &image())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PageError::ReformatFailed {
                detail: "HTTP 500: out of memory".into()
            }
        );
    }
}
