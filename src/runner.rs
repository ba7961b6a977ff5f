//! The batch runner: folder in, Markdown file(s) out.
//!
//! ## Flow per image
//!
//! ```text
//! read ──▶ transcribe ──▶ [reformat] ──▶ clean ──▶ append primary ──▶ [translate ──▶ append translated]
//! ```
//!
//! Images are processed strictly one at a time in [`ImageSet`] order, and a
//! page is written as soon as its pipeline finishes, so the output on disk
//! always holds a prefix of the document.
//!
//! ## Failure handling
//!
//! A failed read, transcription or reformat marks that image as failed and
//! the runner moves on; nothing is retried. A failed translation only drops
//! the page from the translated file, and a translated file that cannot be
//! opened or written only loses the translation. The one fatal condition
//! mid-run is a primary output file that cannot be opened or written.

use crate::config::{BatchConfig, EmptyPagePolicy};
use crate::enumerate::{self, file_name_of, ImageSet};
use crate::error::{Img2MdError, PageError};
use crate::output::{BatchReport, OutputDocument, OutputPaths, PageOutcome, PageResult};
use crate::postprocess;
use crate::progress::{BatchProgressCallback, NoopProgressCallback};
use crate::prompts::is_empty_page;
use crate::provider::{build_collaborators, Collaborators, PageImage};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Convert every image in `folder` using the providers `config` describes.
///
/// Returns an empty report (and writes nothing) when the folder holds no
/// images.
///
/// # Errors
/// Only fatal errors: bad folder, provider setup failure, output I/O failure.
pub async fn run_batch(
    folder: impl AsRef<Path>,
    config: &BatchConfig,
) -> Result<BatchReport, Img2MdError> {
    let folder = enumerate::validate_folder(folder.as_ref())?;
    let images = enumerate::collect_images(&folder)?;
    if images.is_empty() {
        info!("No images found in {}", folder.display());
        return Ok(BatchReport::new(folder));
    }
    let collaborators = build_collaborators(config)?;
    BatchRunner::new(config, collaborators)
        .run(&folder, &images)
        .await
}

/// Like [`run_batch`], with caller-supplied collaborators.
pub async fn run_batch_with(
    folder: impl AsRef<Path>,
    config: &BatchConfig,
    collaborators: Collaborators,
) -> Result<BatchReport, Img2MdError> {
    let folder = enumerate::validate_folder(folder.as_ref())?;
    let images = enumerate::collect_images(&folder)?;
    BatchRunner::new(config, collaborators)
        .run(&folder, &images)
        .await
}

/// Drives one batch over an [`ImageSet`].
pub struct BatchRunner<'a> {
    config: &'a BatchConfig,
    collaborators: Collaborators,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a BatchConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Process `images` in order, writing next to `folder`.
    ///
    /// Output files are named with the current Unix time, see [`OutputPaths`].
    pub async fn run(&self, folder: &Path, images: &ImageSet) -> Result<BatchReport, Img2MdError> {
        let start = Instant::now();
        let mut report = BatchReport::new(folder);
        if images.is_empty() {
            return Ok(report);
        }

        let noop = NoopProgressCallback;
        let progress: &dyn BatchProgressCallback = match &self.config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &noop,
        };

        let target_language = self.config.target_language.as_deref();
        let paths = OutputPaths::for_folder(folder, unix_timestamp(), target_language);
        let mut primary = OutputDocument::create(&paths.primary).await?;
        report.output_path = Some(paths.primary.clone());

        // The translated file is a secondary sink: losing it never stops the batch.
        let mut translated = match (&paths.translated, &self.collaborators.translator) {
            (Some(path), Some(_)) => match OutputDocument::create(path).await {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("{e}; continuing without a translated file");
                    None
                }
            },
            _ => None,
        };
        let translating = paths.translated.is_some() && self.collaborators.translator.is_some();
        report.translated_path = translated.as_ref().map(|d| d.path().to_path_buf());

        let total = images.len();
        info!(
            "Processing {} images from {} → {} via {}",
            total,
            folder.display(),
            paths.primary.display(),
            self.config.provider.label()
        );
        progress.on_batch_start(total, &paths.primary);

        for (i, path) in images.iter().enumerate() {
            let index = i + 1;
            let file_name = file_name_of(path);
            let page_start = Instant::now();
            progress.on_page_start(index, total, &file_name);

            let outcome = match self.process_page(path).await {
                Err(error) => {
                    warn!("{} ({}/{}) failed: {}", file_name, index, total, error);
                    progress.on_page_error(index, total, &file_name, &error.to_string());
                    PageOutcome::Failed { error }
                }
                Ok(page) => {
                    let outcome = self.write_page(&page, &mut primary).await?;
                    if translating && matches!(outcome, PageOutcome::Written { .. }) {
                        self.write_translation(&page, &mut translated, &mut report)
                            .await;
                    }
                    let chars = match outcome {
                        PageOutcome::Written { chars, .. } => chars,
                        _ => 0,
                    };
                    progress.on_page_complete(index, total, &file_name, chars);
                    outcome
                }
            };

            report.pages.push(PageResult {
                index,
                file_name,
                outcome,
                duration_ms: page_start.elapsed().as_millis() as u64,
            });
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Batch complete: {}/{} written, {} skipped, {} failed, {}ms",
            report.written(),
            total,
            report.skipped(),
            report.failed(),
            report.duration_ms
        );
        progress.on_batch_complete(&report);
        Ok(report)
    }

    /// Read, transcribe and optionally reformat one image.
    async fn process_page(&self, path: &Path) -> Result<TranscribedPage, PageError> {
        let image = PageImage::load(path).await?;

        let text = self.collaborators.transcriber.transcribe(&image).await?;
        debug!("{}: transcribed {} chars", image.file_name, text.len());

        let text = match &self.collaborators.reformatter {
            Some(reformatter) if !text.trim().is_empty() && !is_empty_page(&text) => {
                let markdown = reformatter
                    .reformat(&text, &image)
                    .await
                    .map_err(PageError::into_reformat)?;
                debug!("{}: reformatted to {} chars", image.file_name, markdown.len());
                markdown
            }
            _ => text,
        };

        let text = if self.config.clean_output {
            postprocess::clean_markdown(&text)
        } else {
            text
        };
        Ok(TranscribedPage { image, text })
    }

    /// Append a finished page to the primary output and decide its outcome.
    async fn write_page(
        &self,
        page: &TranscribedPage,
        primary: &mut OutputDocument,
    ) -> Result<PageOutcome, Img2MdError> {
        if page.text.trim().is_empty() {
            debug!("{}: no text, skipping", page.image.file_name);
            return Ok(PageOutcome::Skipped);
        }

        let empty_page = is_empty_page(&page.text);
        if empty_page && self.config.empty_pages == EmptyPagePolicy::Skip {
            debug!("{}: blank page suppressed", page.image.file_name);
            return Ok(PageOutcome::Skipped);
        }

        primary.append_page(&page.text).await?;
        Ok(PageOutcome::Written {
            chars: page.text.chars().count(),
            empty_page,
        })
    }

    /// Translate a written page into the secondary file.
    ///
    /// Never fails the batch. A page that does not reach the translated file
    /// is listed in `translation_failures`; a write error closes the file for
    /// the rest of the run.
    async fn write_translation(
        &self,
        page: &TranscribedPage,
        translated: &mut Option<OutputDocument>,
        report: &mut BatchReport,
    ) {
        let file_name = &page.image.file_name;
        let Some(doc) = translated.as_mut() else {
            report.translation_failures.push(file_name.clone());
            return;
        };

        let text = if is_empty_page(&page.text) {
            page.text.clone()
        } else {
            match self.translate(page).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    warn!("{}: translation came back empty", file_name);
                    report.translation_failures.push(file_name.clone());
                    return;
                }
                Err(error) => {
                    warn!("{}: {}", file_name, error);
                    report.translation_failures.push(file_name.clone());
                    return;
                }
            }
        };

        if let Err(e) = doc.append_page(&text).await {
            warn!("{e}; no further pages will be translated");
            report.translation_failures.push(file_name.clone());
            *translated = None;
        }
    }

    async fn translate(&self, page: &TranscribedPage) -> Result<String, PageError> {
        let (Some(translator), Some(language)) = (
            &self.collaborators.translator,
            self.config.target_language.as_deref(),
        ) else {
            return Err(PageError::TranslateFailed {
                detail: "no translator configured".into(),
            });
        };
        let text = translator
            .translate(&page.text, language, &page.image)
            .await
            .map_err(PageError::into_translate)?;
        Ok(if self.config.clean_output {
            postprocess::clean_markdown(&text)
        } else {
            text
        })
    }
}

/// A page that made it through transcription (and reformatting, if enabled).
struct TranscribedPage {
    image: PageImage,
    text: String,
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
