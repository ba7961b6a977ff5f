//! Progress-callback trait for per-image batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the runner works through the folder. The CLI uses it to drive either an
//! indicatif progress bar or plain `Processing i / N` lines.
//!
//! # Example
//!
//! ```rust
//! use edgequake_img2md::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_page_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{index}/{total} {file_name}: {error}");
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { failed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::BatchReport;
use std::path::Path;
use std::sync::Arc;

/// Called by the batch runner as it processes each image.
///
/// Events arrive strictly in image order from a single task. All methods
/// have default no-op implementations so callers only override what they
/// care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the output file has been opened, before the first image.
    ///
    /// # Arguments
    /// * `total`: number of images in the batch
    /// * `output`: path of the primary Markdown file
    fn on_batch_start(&self, total: usize, output: &Path) {
        let _ = (total, output);
    }

    /// Called just before an image is read and sent for transcription.
    ///
    /// `index` is 1-based.
    fn on_page_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when an image finished without a page-level failure.
    ///
    /// `chars` is the number of characters written to the primary file
    /// (0 when the page was skipped).
    fn on_page_complete(&self, index: usize, total: usize, file_name: &str, chars: usize) {
        let _ = (index, total, file_name, chars);
    }

    /// Called when an image failed; the batch continues with the next one.
    fn on_page_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        let _ = (index, total, file_name, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
