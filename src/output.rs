//! Output types: the append-only Markdown sink and the batch report.
//!
//! [`OutputDocument`] is written page by page as the batch runs, so whatever
//! was appended before a crash or Ctrl-C is already on disk. [`BatchReport`]
//! collects one [`PageResult`] per image in folder order.

use crate::error::{Img2MdError, PageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Written after every page's content.
pub const PAGE_SEPARATOR: &str = "\n\n";

// ── Output paths ─────────────────────────────────────────────────────────

/// Where a batch writes its Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// `<parent>/<folder>_<timestamp>.md`
    pub primary: PathBuf,
    /// `<parent>/<folder>_<timestamp>_<language>.md`, when translating.
    pub translated: Option<PathBuf>,
}

impl OutputPaths {
    /// Derive the output file names for `folder`, placed next to it.
    ///
    /// `folder` should already be canonical (see
    /// [`crate::enumerate::validate_folder`]); a path without a parent writes
    /// into the current directory.
    pub fn for_folder(folder: &Path, timestamp: u64, target_language: Option<&str>) -> Self {
        Self {
            primary: build_output_path(folder, timestamp, None),
            translated: target_language.map(|lang| build_output_path(folder, timestamp, Some(lang))),
        }
    }
}

fn build_output_path(folder: &Path, timestamp: u64, suffix: Option<&str>) -> PathBuf {
    let stem = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "images".to_string());
    let file_name = match suffix {
        Some(s) => format!("{stem}_{timestamp}_{}.md", sanitise_label(s)),
        None => format!("{stem}_{timestamp}.md"),
    };
    folder
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
        .join(file_name)
}

/// Make a language label safe to embed in a file name.
fn sanitise_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

// ── OutputDocument ───────────────────────────────────────────────────────

/// An append-only Markdown file.
///
/// Each [`append_page`](Self::append_page) writes the content plus
/// [`PAGE_SEPARATOR`] and flushes before returning. Nothing already written
/// is ever rewritten.
#[derive(Debug)]
pub struct OutputDocument {
    path: PathBuf,
    file: File,
    pages: usize,
}

impl OutputDocument {
    /// Create (or truncate) the file at `path`.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, Img2MdError> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .map_err(|e| Img2MdError::OutputOpenFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Opened output {}", path.display());
        Ok(Self {
            path,
            file,
            pages: 0,
        })
    }

    /// Append one page followed by a blank line.
    pub async fn append_page(&mut self, content: &str) -> Result<(), Img2MdError> {
        let result = async {
            self.file.write_all(content.as_bytes()).await?;
            self.file.write_all(PAGE_SEPARATOR.as_bytes()).await?;
            self.file.flush().await
        }
        .await;
        result.map_err(|e| Img2MdError::OutputWriteFailed {
            path: self.path.clone(),
            source: e,
        })?;
        self.pages += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages appended so far.
    pub fn pages_written(&self) -> usize {
        self.pages
    }
}

// ── Per-page results ─────────────────────────────────────────────────────

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    /// Content was appended to the primary document.
    Written {
        /// Characters of Markdown written (separator excluded).
        chars: usize,
        /// The page is the blank-page sentinel, kept as-is.
        empty_page: bool,
    },
    /// Nothing was written: the model returned no text, or a blank-page
    /// sentinel was suppressed.
    Skipped,
    /// The page failed; nothing was written for it.
    Failed { error: PageError },
}

/// Result of processing a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based position in the image set.
    pub index: usize,
    pub file_name: String,
    pub outcome: PageOutcome,
    /// Wall-clock time spent on this image, all stages included.
    pub duration_ms: u64,
}

impl PageResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PageOutcome::Failed { .. })
    }

    pub fn error(&self) -> Option<&PageError> {
        match &self.outcome {
            PageOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

// ── BatchReport ──────────────────────────────────────────────────────────

/// Everything a finished batch has to say about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// The (canonical) image folder.
    pub folder: PathBuf,
    /// One entry per image, in image order.
    pub pages: Vec<PageResult>,
    /// Primary Markdown file; `None` when the folder held no images.
    pub output_path: Option<PathBuf>,
    /// Translated Markdown file, when translation was requested.
    pub translated_path: Option<PathBuf>,
    /// Images whose primary content was written but whose translation failed.
    pub translation_failures: Vec<String>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// An empty report for `folder`; nothing processed, nothing written.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            pages: Vec::new(),
            output_path: None,
            translated_path: None,
            translation_failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Number of images attempted.
    pub fn total(&self) -> usize {
        self.pages.len()
    }

    /// Number of pages appended to the primary document.
    pub fn written(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.outcome, PageOutcome::Written { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.outcome, PageOutcome::Skipped))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.pages.iter().filter(|p| p.is_failed()).count()
    }

    /// File names of failed images, in image order.
    pub fn failed_files(&self) -> Vec<&str> {
        self.pages
            .iter()
            .filter(|p| p.is_failed())
            .map(|p| p.file_name.as_str())
            .collect()
    }

    /// `true` when the folder held no images and nothing was written.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.output_path.is_none()
    }
}
