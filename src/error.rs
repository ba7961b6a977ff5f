//! Error types for the edgequake-img2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Img2MdError`] is **fatal**: the batch cannot start or cannot continue
//!   (bad folder argument, unusable configuration, output file cannot be
//!   opened or written). Returned as `Err(Img2MdError)` from the runner.
//!
//! * [`PageError`] is **non-fatal**: a single image failed (unreadable file,
//!   transport error, API-reported error) but the rest of the batch is fine.
//!   Stored inside [`crate::output::PageOutcome::Failed`] and listed in the
//!   end-of-run report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-img2md library.
#[derive(Debug, Error)]
pub enum Img2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The image folder does not exist.
    #[error("Folder not found: '{path}'\nUsage: img2md <img_folder>  (e.g. `img2md .` for the current folder)")]
    FolderNotFound { path: PathBuf },

    /// The path exists but is not a directory.
    #[error("Not a directory: '{path}'\nUsage: img2md <img_folder>  (e.g. `img2md .` for the current folder)")]
    NotADirectory { path: PathBuf },

    /// Listing the folder failed.
    #[error("Failed to read folder '{path}': {source}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output Markdown file could not be created.
    #[error("Failed to open output file '{path}': {source}")]
    OutputOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Appending a page to the output Markdown file failed.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Provider / config errors ──────────────────────────────────────────
    /// The configured provider could not be initialised.
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// The batch records it against the image's file name and moves on; no
/// retry is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageError {
    /// The image file could not be read from disk.
    #[error("could not read image: {detail}")]
    ReadFailed { detail: String },

    /// The request never produced an HTTP response (DNS, connect, reset…).
    #[error("request failed: {detail}")]
    Transport { detail: String },

    /// The endpoint answered with a non-success HTTP status.
    #[error("HTTP {status}: {detail}")]
    HttpStatus { status: u16, detail: String },

    /// The response body was not the JSON shape the client expects.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },

    /// The response parsed fine but carried an error object.
    #[error("API error: {detail}")]
    ApiError { detail: String },

    /// The call did not finish within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The reformatting stage failed; the page has no usable Markdown.
    #[error("reformat failed: {detail}")]
    ReformatFailed { detail: String },

    /// The translation stage failed.
    #[error("translation failed: {detail}")]
    TranslateFailed { detail: String },
}

impl PageError {
    /// Wrap this error as a reformat-stage failure, keeping its message.
    pub fn into_reformat(self) -> Self {
        match self {
            e @ PageError::ReformatFailed { .. } => e,
            other => PageError::ReformatFailed {
                detail: other.to_string(),
            },
        }
    }

    /// Wrap this error as a translation-stage failure, keeping its message.
    pub fn into_translate(self) -> Self {
        match self {
            e @ PageError::TranslateFailed { .. } => e,
            other => PageError::TranslateFailed {
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_not_found_mentions_usage() {
        let e = Img2MdError::FolderNotFound {
            path: PathBuf::from("/nope"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/nope"), "got: {msg}");
        assert!(msg.contains("Usage"), "got: {msg}");
    }

    #[test]
    fn http_status_display() {
        let e = PageError::HttpStatus {
            status: 502,
            detail: "bad gateway".into(),
        };
        assert_eq!(e.to_string(), "HTTP 502: bad gateway");
    }

    #[test]
    fn timeout_display() {
        let e = PageError::Timeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn into_reformat_wraps_message() {
        let e = PageError::Transport {
            detail: "connection reset".into(),
        }
        .into_reformat();
        assert!(matches!(e, PageError::ReformatFailed { .. }));
        assert!(e.to_string().contains("connection reset"));
    }

    #[test]
    fn into_translate_is_idempotent() {
        let e = PageError::TranslateFailed {
            detail: "x".into(),
        };
        assert_eq!(e.clone().into_translate(), e);
    }

    #[test]
    fn page_error_serialises_with_kind_tag() {
        let e = PageError::ApiError {
            detail: "model not found".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"kind\":\"api_error\""), "got: {json}");
    }
}
