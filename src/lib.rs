//! # edgequake-img2md
//!
//! Batch-convert a folder of page images into one Markdown document using
//! OCR-capable vision language models.
//!
//! ## Pipeline Overview
//!
//! ```text
//! folder
//!  │
//!  ├─ 1. Enumerate  png / jpg / jpeg files, natural order (p2 before p10)
//!  ├─ 2. Transcribe one model call per image
//!  ├─ 3. Reformat   optional second call: raw OCR text → Markdown
//!  ├─ 4. Clean      deterministic fixes (fences, CRLF, blank runs)
//!  ├─ 5. Write      append to <folder>_<timestamp>.md as soon as the page is done
//!  └─ 6. Translate  optional third call → <folder>_<timestamp>_<lang>.md
//! ```
//!
//! Images are processed one at a time. A failing image is recorded in the
//! [`BatchReport`] and skipped; only output-file I/O errors abort the batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2md::{run_batch, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .api_url("http://localhost:8000/v1/chat/completions")
//!         .model("qwen2.5-vl-7b-instruct")
//!         .build()?;
//!     let report = run_batch("./scans", &config).await?;
//!     eprintln!("{} pages written, failed: {:?}", report.written(), report.failed_files());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2md` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod enumerate;
pub mod error;
pub mod output;
pub mod postprocess;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod runner;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BatchConfig, BatchConfigBuilder, EmptyPagePolicy, ProviderKind};
pub use enumerate::{collect_images, natural_cmp, ImageSet};
pub use error::{Img2MdError, PageError};
pub use output::{BatchReport, OutputDocument, OutputPaths, PageOutcome, PageResult};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use provider::{
    build_collaborators, Collaborators, PageImage, PageReformatter, PageTranscriber,
    PageTranslator,
};
pub use runner::{run_batch, run_batch_with, BatchRunner};
