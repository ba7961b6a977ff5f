//! Configuration types for a batch image-to-Markdown run.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The CLI maps its flags and environment variables
//! onto the builder once at startup; the runner only ever sees the finished,
//! immutable struct.

use crate::error::Img2MdError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default model, matching a common local Ollama vision model.
pub const DEFAULT_MODEL: &str = "llama3.2-vision:11b-instruct-q4_K_M";

/// Default OpenAI-compatible chat-completions endpoint (Ollama's `/v1` shim).
pub const DEFAULT_COMPAT_URL: &str = "http://localhost:11434/v1/chat/completions";

/// Default native Ollama generate endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use edgequake_img2md::{BatchConfig, ProviderKind};
///
/// let config = BatchConfig::builder()
///     .provider(ProviderKind::Ollama)
///     .model("llava:13b")
///     .target_language("English")
///     .build()
///     .unwrap();
/// assert_eq!(config.endpoint(), "http://localhost:11434/api/generate");
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Which back end serves the transcription / reformat / translate calls.
    pub provider: ProviderKind,

    /// Endpoint URL. `None` means the provider's default, see [`BatchConfig::endpoint`].
    pub api_url: Option<String>,

    /// Model used for transcription.
    pub model: String,

    /// Model used for reformatting. Falls back to `model`.
    pub format_model: Option<String>,

    /// Model used for translation. Falls back to `format_model`, then `model`.
    pub translate_model: Option<String>,

    /// Bearer credential sent with each request, if any.
    pub api_key: Option<String>,

    /// Per-call timeout in seconds. Default: 120.
    pub timeout_secs: u64,

    /// Run the raw transcription through the reformatting stage. Default: false.
    pub reformat: bool,

    /// Translate every written page into this language and write a second file.
    pub target_language: Option<String>,

    /// What to do with pages the model marks as [`crate::prompts::EMPTY_PAGE`].
    pub empty_pages: EmptyPagePolicy,

    /// Apply [`crate::postprocess::clean_markdown`] before writing. Default: true.
    pub clean_output: bool,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. `None` leaves it to the server.
    pub max_tokens: Option<usize>,

    /// Custom transcription system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Receives per-page events while the batch runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_url: None,
            model: DEFAULT_MODEL.to_string(),
            format_model: None,
            translate_model: None,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            reformat: false,
            target_language: None,
            empty_pages: EmptyPagePolicy::default(),
            clean_output: true,
            temperature: 0.1,
            max_tokens: None,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint())
            .field("model", &self.model)
            .field("format_model", &self.format_model)
            .field("translate_model", &self.translate_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("reformat", &self.reformat)
            .field("target_language", &self.target_language)
            .field("empty_pages", &self.empty_pages)
            .field("clean_output", &self.clean_output)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The endpoint to call: the explicit `api_url`, else the provider default.
    pub fn endpoint(&self) -> &str {
        match self.api_url.as_deref() {
            Some(url) => url,
            None => self.provider.default_url(),
        }
    }

    /// Model for the reformatting stage.
    pub fn format_model(&self) -> &str {
        self.format_model.as_deref().unwrap_or(&self.model)
    }

    /// Model for the translation stage.
    pub fn translate_model(&self) -> &str {
        self.translate_model
            .as_deref()
            .unwrap_or_else(|| self.format_model())
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn format_model(mut self, model: impl Into<String>) -> Self {
        self.config.format_model = Some(model.into());
        self
    }

    pub fn translate_model(mut self, model: impl Into<String>) -> Self {
        self.config.translate_model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn reformat(mut self, v: bool) -> Self {
        self.config.reformat = v;
        self
    }

    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.config.target_language = Some(language.into());
        self
    }

    pub fn empty_pages(mut self, policy: EmptyPagePolicy) -> Self {
        self.config.empty_pages = policy;
        self
    }

    pub fn clean_output(mut self, v: bool) -> Self {
        self.config.clean_output = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, Img2MdError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(Img2MdError::InvalidConfig("model must not be empty".into()));
        }
        if c.timeout_secs == 0 {
            return Err(Img2MdError::InvalidConfig(
                "timeout must be at least 1 second".into(),
            ));
        }
        if !matches!(c.provider, ProviderKind::Factory(_)) {
            let url = c.endpoint();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Img2MdError::InvalidConfig(format!(
                    "endpoint must be an http:// or https:// URL, got '{url}'"
                )));
            }
        }
        if let ProviderKind::Factory(name) = &c.provider {
            if name.trim().is_empty() {
                return Err(Img2MdError::InvalidConfig(
                    "provider name must not be empty".into(),
                ));
            }
        }
        if let Some(lang) = &c.target_language {
            if lang.trim().is_empty() {
                return Err(Img2MdError::InvalidConfig(
                    "target language must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The back end that serves model calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/chat/completions` endpoint (vLLM, LM Studio, Ollama `/v1`, …).
    #[default]
    OpenAiCompatible,
    /// Native Ollama `/api/generate`.
    Ollama,
    /// A named provider created through `edgequake_llm::ProviderFactory`
    /// (e.g. "openai", "anthropic", "gemini"). Credentials come from that
    /// provider's own environment variables.
    Factory(String),
}

impl ProviderKind {
    /// Parse a provider label as accepted by the CLI.
    ///
    /// `openai-compatible` (alias `compat`) and `ollama` select the built-in
    /// HTTP clients; anything else is handed to the provider factory.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "" | "openai-compatible" | "compat" => ProviderKind::OpenAiCompatible,
            "ollama" => ProviderKind::Ollama,
            other => ProviderKind::Factory(other.to_string()),
        }
    }

    /// Default endpoint for the built-in clients.
    pub fn default_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => DEFAULT_OLLAMA_URL,
            _ => DEFAULT_COMPAT_URL,
        }
    }

    /// Short label for logs and errors.
    pub fn label(&self) -> &str {
        match self {
            ProviderKind::OpenAiCompatible => "openai-compatible",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Factory(name) => name,
        }
    }
}

/// How pages the model reports as blank are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmptyPagePolicy {
    /// Write the sentinel text as-is, keeping one entry per page. (default)
    #[default]
    Keep,
    /// Leave the page out of the output document.
    Skip,
}
