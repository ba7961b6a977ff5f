//! Model collaborators: transcription, reformatting and translation.
//!
//! The runner only sees three small capability traits. Each back end
//! implements all three with its own wire format:
//!
//! | Module | Back end |
//! |--------|----------|
//! | [`openai`] | any OpenAI-compatible `/chat/completions` endpoint |
//! | [`ollama`] | native Ollama `/api/generate` |
//! | [`llm`]    | any `edgequake_llm::LLMProvider` (OpenAI, Anthropic, Gemini, …) |
//!
//! None of them retry: a failed call is reported once and the page is marked
//! failed.

pub mod llm;
pub mod ollama;
pub mod openai;

use crate::config::{BatchConfig, ProviderKind};
use crate::enumerate::file_name_of;
use crate::error::{Img2MdError, PageError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Turns a page image into raw text.
#[async_trait]
pub trait PageTranscriber: Send + Sync {
    async fn transcribe(&self, image: &PageImage) -> Result<String, PageError>;
}

/// Turns raw OCR text into Markdown, using the image as layout reference.
#[async_trait]
pub trait PageReformatter: Send + Sync {
    async fn reformat(&self, text: &str, image: &PageImage) -> Result<String, PageError>;
}

/// Translates a page's Markdown into another language.
#[async_trait]
pub trait PageTranslator: Send + Sync {
    async fn translate(
        &self,
        markdown: &str,
        target_language: &str,
        image: &PageImage,
    ) -> Result<String, PageError>;
}

/// The collaborators a batch runs with. Reformatter and translator are
/// optional stages.
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn PageTranscriber>,
    pub reformatter: Option<Arc<dyn PageReformatter>>,
    pub translator: Option<Arc<dyn PageTranslator>>,
}

impl Collaborators {
    /// Transcription only.
    pub fn new(transcriber: Arc<dyn PageTranscriber>) -> Self {
        Self {
            transcriber,
            reformatter: None,
            translator: None,
        }
    }

    pub fn with_reformatter(mut self, reformatter: Arc<dyn PageReformatter>) -> Self {
        self.reformatter = Some(reformatter);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn PageTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }
}

/// Build the collaborators `config` asks for.
///
/// The reformatter is present only when `config.reformat` is set, the
/// translator only when a target language is set. Each stage gets its own
/// client so it can use its own model.
pub fn build_collaborators(config: &BatchConfig) -> Result<Collaborators, Img2MdError> {
    let needs_reformat = config.reformat;
    let needs_translate = config.target_language.is_some();

    let collaborators = match &config.provider {
        ProviderKind::OpenAiCompatible => {
            let http = http_client(config.timeout_secs)?;
            let client = |model: &str| {
                Arc::new(openai::OpenAiCompatibleClient::new(http.clone(), config, model))
            };
            let mut c = Collaborators::new(client(&config.model));
            if needs_reformat {
                c = c.with_reformatter(client(config.format_model()));
            }
            if needs_translate {
                c = c.with_translator(client(config.translate_model()));
            }
            c
        }
        ProviderKind::Ollama => {
            let http = http_client(config.timeout_secs)?;
            let client =
                |model: &str| Arc::new(ollama::OllamaClient::new(http.clone(), config, model));
            let mut c = Collaborators::new(client(&config.model));
            if needs_reformat {
                c = c.with_reformatter(client(config.format_model()));
            }
            if needs_translate {
                c = c.with_translator(client(config.translate_model()));
            }
            c
        }
        ProviderKind::Factory(name) => {
            let mut c = Collaborators::new(Arc::new(llm::LlmProviderClient::from_factory(
                name,
                &config.model,
                config,
            )?));
            if needs_reformat {
                c = c.with_reformatter(Arc::new(llm::LlmProviderClient::from_factory(
                    name,
                    config.format_model(),
                    config,
                )?));
            }
            if needs_translate {
                c = c.with_translator(Arc::new(llm::LlmProviderClient::from_factory(
                    name,
                    config.translate_model(),
                    config,
                )?));
            }
            c
        }
    };
    Ok(collaborators)
}

// ── PageImage ────────────────────────────────────────────────────────────

/// One page image, loaded into memory for the duration of its pipeline.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub path: PathBuf,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl PageImage {
    /// Read an image from disk. A read failure is a page-level error.
    pub async fn load(path: &Path) -> Result<Self, PageError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PageError::ReadFailed {
                detail: format!("{}: {e}", path.display()),
            })?;
        Ok(Self::from_bytes(path, bytes))
    }

    /// Wrap bytes already in memory; the MIME type is sniffed from content.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let mime_type = sniff_mime_type(&path, &bytes);
        debug!(
            "Loaded {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            mime_type
        );
        Self {
            file_name: file_name_of(&path),
            path,
            bytes,
            mime_type,
        }
    }

    /// Standard base64 of the raw bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<…>` URI for `image_url` content parts.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Detect PNG / JPEG from magic bytes; fall back to the file extension.
fn sniff_mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        _ => match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => "image/png",
        },
    }
}

/// Build the HTTP client shared by the built-in back ends, with the per-call timeout.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, Img2MdError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Img2MdError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Map a reqwest failure (send or body read) to a page error.
pub(crate) fn request_error(e: reqwest::Error, timeout_secs: u64) -> PageError {
    if e.is_timeout() {
        PageError::Timeout { secs: timeout_secs }
    } else {
        PageError::Transport {
            detail: e.to_string(),
        }
    }
}

/// Human-readable text of an `error` field: a bare string or `{ "message": … }`.
pub(crate) fn error_message(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
        other => other.to_string(),
    }
}

/// Shorten a response body for inclusion in an error message.
pub(crate) fn truncate_detail(body: &str) -> String {
    const MAX: usize = 300;
    let body = body.trim();
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}
