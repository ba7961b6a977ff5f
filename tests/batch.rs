//! Batch-level integration tests for edgequake-img2md.
//!
//! These drive the runner end to end against scripted in-process
//! collaborators, so no model server or API key is needed. Model output is
//! non-deterministic in real runs, so the assertions here are structural:
//! which files exist, page order, failure accounting.
//!
//! Run with:
//!   cargo test --test batch -- --nocapture

use async_trait::async_trait;
use edgequake_img2md::{
    run_batch, run_batch_with, BatchConfig, BatchProgressCallback, BatchReport, Collaborators,
    EmptyPagePolicy, PageError, PageImage, PageOutcome, PageReformatter, PageTranscriber,
    PageTranslator,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create `<tmp>/scans` holding tiny PNG-magic files with the given names.
fn scans_folder(tmp: &TempDir, names: &[&str]) -> PathBuf {
    let folder = tmp.path().join("scans");
    std::fs::create_dir(&folder).unwrap();
    for name in names {
        std::fs::write(folder.join(name), b"\x89PNG\r\n\x1a\n").unwrap();
    }
    folder
}

/// `.md` files next to the scans folder.
fn markdown_files(tmp: &TempDir) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "md"))
        .collect();
    files.sort();
    files
}

fn read(path: &Option<PathBuf>) -> String {
    std::fs::read_to_string(path.as_ref().expect("output path")).unwrap()
}

/// Pages of an output file, split on the blank-line separator.
fn pages_of(content: &str) -> Vec<&str> {
    content
        .split("\n\n")
        .filter(|p| !p.is_empty())
        .collect()
}

/// Returns scripted text per file name, `page <name>` by default, and
/// fails for the names in `failures`.
#[derive(Default)]
struct ScriptedTranscriber {
    replies: HashMap<String, String>,
    failures: Vec<String>,
}

impl ScriptedTranscriber {
    fn failing(names: &[&str]) -> Self {
        Self {
            failures: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn replying(pairs: &[(&str, &str)]) -> Self {
        Self {
            replies: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PageTranscriber for ScriptedTranscriber {
    async fn transcribe(&self, image: &PageImage) -> Result<String, PageError> {
        if self.failures.contains(&image.file_name) {
            return Err(PageError::Transport {
                detail: format!("connection reset while sending {}", image.file_name),
            });
        }
        Ok(self
            .replies
            .get(&image.file_name)
            .cloned()
            .unwrap_or_else(|| format!("page {}", image.file_name)))
    }
}

/// Upper-cases its input and wraps it in a fence the cleaner must strip.
struct ShoutingReformatter;

#[async_trait]
impl PageReformatter for ShoutingReformatter {
    async fn reformat(&self, text: &str, _image: &PageImage) -> Result<String, PageError> {
        Ok(format!("```markdown\n# {}\n```", text.to_uppercase()))
    }
}

/// Prefixes the language; fails for the names in `failures`.
#[derive(Default)]
struct TaggingTranslator {
    failures: Vec<String>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl PageTranslator for TaggingTranslator {
    async fn translate(
        &self,
        markdown: &str,
        target_language: &str,
        image: &PageImage,
    ) -> Result<String, PageError> {
        self.calls.lock().unwrap().push(image.file_name.clone());
        if self.failures.contains(&image.file_name) {
            return Err(PageError::HttpStatus {
                status: 503,
                detail: "overloaded".into(),
            });
        }
        Ok(format!("[{target_language}] {markdown}"))
    }
}

// ── Enumeration + ordering ───────────────────────────────────────────────────

#[tokio::test]
async fn pages_are_written_in_natural_order() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["p2.png", "p10.png", "p1.png"]);

    let report = run_batch_with(
        &folder,
        &BatchConfig::default(),
        Collaborators::new(Arc::new(ScriptedTranscriber::default())),
    )
    .await
    .unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.failed(), 0);
    let names: Vec<_> = report.pages.iter().map(|p| p.file_name.as_str()).collect();
    assert_eq!(names, vec!["p1.png", "p2.png", "p10.png"]);
    let indices: Vec<_> = report.pages.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);

    assert_eq!(
        read(&report.output_path),
        "page p1.png\n\npage p2.png\n\npage p10.png\n\n"
    );
}

#[tokio::test]
async fn output_file_is_named_after_folder_and_placed_beside_it() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.jpg"]);

    let report = run_batch_with(
        &folder,
        &BatchConfig::default(),
        Collaborators::new(Arc::new(ScriptedTranscriber::default())),
    )
    .await
    .unwrap();

    let out = report.output_path.unwrap();
    assert_eq!(
        out.parent().unwrap(),
        std::fs::canonicalize(tmp.path()).unwrap()
    );
    let name = out.file_name().unwrap().to_string_lossy().into_owned();
    let stamp = name
        .strip_prefix("scans_")
        .and_then(|s| s.strip_suffix(".md"))
        .expect("scans_<timestamp>.md");
    assert!(stamp.parse::<u64>().is_ok(), "got {name}");
    assert!(report.translated_path.is_none());
}

#[tokio::test]
async fn empty_folder_writes_no_file() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &[]);
    std::fs::write(folder.join("readme.txt"), "not an image").unwrap();

    // The built-in providers are never contacted for an empty folder.
    let report = run_batch(&folder, &BatchConfig::default()).await.unwrap();

    assert!(report.is_empty());
    assert!(report.output_path.is_none());
    assert!(markdown_files(&tmp).is_empty());
}

#[tokio::test]
async fn missing_folder_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let err = run_batch(tmp.path().join("nope"), &BatchConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Folder not found"), "got: {err}");
}

// ── Failure accounting ───────────────────────────────────────────────────────

#[tokio::test]
async fn one_failed_transcription_leaves_a_gap() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["1.png", "2.png", "3.png", "4.png"]);

    let report = run_batch_with(
        &folder,
        &BatchConfig::default(),
        Collaborators::new(Arc::new(ScriptedTranscriber::failing(&["3.png"]))),
    )
    .await
    .unwrap();

    assert_eq!(report.total(), 4);
    assert_eq!(report.failed_files(), vec!["3.png"]);
    assert!(matches!(
        report.pages[2].outcome,
        PageOutcome::Failed {
            error: PageError::Transport { .. }
        }
    ));

    let content = read(&report.output_path);
    assert_eq!(
        pages_of(&content),
        vec!["page 1.png", "page 2.png", "page 4.png"]
    );
}

#[tokio::test]
async fn every_page_failing_still_completes() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png", "b.png"]);

    let report = run_batch_with(
        &folder,
        &BatchConfig::default(),
        Collaborators::new(Arc::new(ScriptedTranscriber::failing(&["a.png", "b.png"]))),
    )
    .await
    .unwrap();

    assert_eq!(report.failed_files(), vec!["a.png", "b.png"]);
    assert_eq!(read(&report.output_path), "");
}

#[tokio::test]
async fn empty_transcription_is_skipped_not_failed() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png", "b.png"]);

    let report = run_batch_with(
        &folder,
        &BatchConfig::default(),
        Collaborators::new(Arc::new(ScriptedTranscriber::replying(&[("a.png", "  \n")]))),
    )
    .await
    .unwrap();

    assert_eq!(report.failed(), 0);
    assert_eq!(report.pages[0].outcome, PageOutcome::Skipped);
    assert_eq!(read(&report.output_path), "page b.png\n\n");
}

// ── Incremental writes ───────────────────────────────────────────────────────

/// Snapshots the output file when it reaches a given image.
struct SnapshotTranscriber {
    watch_dir: PathBuf,
    at: String,
    snapshot: Mutex<Option<String>>,
}

#[async_trait]
impl PageTranscriber for SnapshotTranscriber {
    async fn transcribe(&self, image: &PageImage) -> Result<String, PageError> {
        if image.file_name == self.at {
            let md = std::fs::read_dir(&self.watch_dir)
                .unwrap()
                .map(|e| e.unwrap().path())
                .find(|p| p.extension().is_some_and(|e| e == "md"))
                .expect("output file exists before the batch ends");
            *self.snapshot.lock().unwrap() = Some(std::fs::read_to_string(md).unwrap());
        }
        Ok(format!("page {}", image.file_name))
    }
}

#[tokio::test]
async fn earlier_pages_are_on_disk_before_later_ones_run() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["p1.png", "p2.png", "p3.png", "p4.png"]);
    let transcriber = Arc::new(SnapshotTranscriber {
        watch_dir: tmp.path().to_path_buf(),
        at: "p3.png".into(),
        snapshot: Mutex::new(None),
    });

    run_batch_with(
        &folder,
        &BatchConfig::default(),
        Collaborators::new(transcriber.clone()),
    )
    .await
    .unwrap();

    assert_eq!(
        transcriber.snapshot.lock().unwrap().as_deref(),
        Some("page p1.png\n\npage p2.png\n\n")
    );
}

// ── Reformat + clean ─────────────────────────────────────────────────────────

#[tokio::test]
async fn reformatted_output_is_cleaned() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png"]);
    let config = BatchConfig::builder().reformat(true).build().unwrap();
    let collaborators = Collaborators::new(Arc::new(ScriptedTranscriber::default()))
        .with_reformatter(Arc::new(ShoutingReformatter));

    let report = run_batch_with(&folder, &config, collaborators).await.unwrap();

    assert_eq!(read(&report.output_path), "# PAGE A.PNG\n\n");
}

#[tokio::test]
async fn no_clean_keeps_model_output_verbatim() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png"]);
    let config = BatchConfig::builder().clean_output(false).build().unwrap();
    let collaborators = Collaborators::new(Arc::new(ScriptedTranscriber::replying(&[(
        "a.png",
        "```\nraw\n```",
    )])));

    let report = run_batch_with(&folder, &config, collaborators).await.unwrap();

    assert_eq!(read(&report.output_path), "```\nraw\n```\n\n");
}

// ── Blank-page sentinel ──────────────────────────────────────────────────────

#[tokio::test]
async fn empty_page_sentinel_is_kept_by_default() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["1.png", "2.png"]);
    let collaborators = Collaborators::new(Arc::new(ScriptedTranscriber::replying(&[(
        "1.png",
        "EMPTY_PAGE",
    )])));

    let report = run_batch_with(&folder, &BatchConfig::default(), collaborators)
        .await
        .unwrap();

    assert_eq!(
        report.pages[0].outcome,
        PageOutcome::Written {
            chars: 10,
            empty_page: true
        }
    );
    assert_eq!(read(&report.output_path), "EMPTY_PAGE\n\npage 2.png\n\n");
}

#[tokio::test]
async fn empty_page_sentinel_can_be_skipped() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["1.png", "2.png"]);
    let config = BatchConfig::builder()
        .empty_pages(EmptyPagePolicy::Skip)
        .build()
        .unwrap();
    let collaborators = Collaborators::new(Arc::new(ScriptedTranscriber::replying(&[(
        "1.png",
        "EMPTY_PAGE",
    )])));

    let report = run_batch_with(&folder, &config, collaborators).await.unwrap();

    assert_eq!(report.pages[0].outcome, PageOutcome::Skipped);
    assert_eq!(report.failed(), 0);
    assert_eq!(read(&report.output_path), "page 2.png\n\n");
}

// ── Translation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn translation_writes_a_mirrored_second_file() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["p1.png", "p2.png", "p3.png"]);
    let config = BatchConfig::builder()
        .target_language("English")
        .build()
        .unwrap();
    let translator = Arc::new(TaggingTranslator::default());
    let collaborators = Collaborators::new(Arc::new(ScriptedTranscriber::failing(&["p2.png"])))
        .with_translator(translator.clone());

    let report = run_batch_with(&folder, &config, collaborators).await.unwrap();

    assert_eq!(markdown_files(&tmp).len(), 2);
    let translated_path = report.translated_path.clone().unwrap();
    assert!(translated_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_English.md"));

    let primary = read(&report.output_path);
    let translated = read(&report.translated_path);
    assert_eq!(pages_of(&primary), vec!["page p1.png", "page p3.png"]);
    assert_eq!(
        pages_of(&translated),
        vec!["[English] page p1.png", "[English] page p3.png"]
    );
    // Failed pages are never sent for translation.
    assert_eq!(*translator.calls.lock().unwrap(), vec!["p1.png", "p3.png"]);
}

#[tokio::test]
async fn translation_failure_keeps_primary_page() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png", "b.png"]);
    let config = BatchConfig::builder()
        .target_language("French")
        .build()
        .unwrap();
    let translator = Arc::new(TaggingTranslator {
        failures: vec!["a.png".into()],
        ..Default::default()
    });
    let collaborators =
        Collaborators::new(Arc::new(ScriptedTranscriber::default())).with_translator(translator);

    let report = run_batch_with(&folder, &config, collaborators).await.unwrap();

    assert_eq!(report.failed(), 0);
    assert_eq!(report.translation_failures, vec!["a.png"]);
    assert_eq!(pages_of(&read(&report.output_path)).len(), 2);
    assert_eq!(
        pages_of(&read(&report.translated_path)),
        vec!["[French] page b.png"]
    );
}

#[tokio::test]
async fn unopenable_translated_file_does_not_stop_the_batch() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png", "b.png"]);
    // Longer than any file-name limit, so only the translated file fails to open.
    let config = BatchConfig::builder()
        .target_language("x".repeat(300))
        .build()
        .unwrap();
    let collaborators = Collaborators::new(Arc::new(ScriptedTranscriber::default()))
        .with_translator(Arc::new(TaggingTranslator::default()));

    let report = run_batch_with(&folder, &config, collaborators).await.unwrap();

    assert_eq!(report.failed(), 0);
    assert_eq!(report.written(), 2);
    assert!(report.translated_path.is_none());
    assert_eq!(report.translation_failures, vec!["a.png", "b.png"]);
    assert_eq!(read(&report.output_path), "page a.png\n\npage b.png\n\n");
    assert_eq!(markdown_files(&tmp).len(), 1);
}

#[tokio::test]
async fn sentinel_pages_are_mirrored_without_translation() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png", "b.png"]);
    let config = BatchConfig::builder()
        .target_language("German")
        .build()
        .unwrap();
    let translator = Arc::new(TaggingTranslator::default());
    let collaborators = Collaborators::new(Arc::new(ScriptedTranscriber::replying(&[(
        "a.png",
        "EMPTY_PAGE",
    )])))
    .with_translator(translator.clone());

    let report = run_batch_with(&folder, &config, collaborators).await.unwrap();

    assert_eq!(
        read(&report.translated_path),
        "EMPTY_PAGE\n\n[German] page b.png\n\n"
    );
    assert_eq!(*translator.calls.lock().unwrap(), vec!["b.png"]);
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl BatchProgressCallback for RecordingProgress {
    fn on_batch_start(&self, total: usize, _output: &Path) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }
    fn on_page_complete(&self, index: usize, _total: usize, file_name: &str, _chars: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("ok {index} {file_name}"));
    }
    fn on_page_error(&self, index: usize, _total: usize, file_name: &str, _error: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("err {index} {file_name}"));
    }
    fn on_batch_complete(&self, report: &BatchReport) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {}", report.failed()));
    }
}

#[tokio::test]
async fn progress_events_follow_image_order() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["b.png", "a.png"]);
    let progress = Arc::new(RecordingProgress::default());
    let config = BatchConfig::builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    run_batch_with(
        &folder,
        &config,
        Collaborators::new(Arc::new(ScriptedTranscriber::failing(&["a.png"]))),
    )
    .await
    .unwrap();

    assert_eq!(
        *progress.events.lock().unwrap(),
        vec!["start 2", "err 1 a.png", "ok 2 b.png", "done 1"]
    );
}

// ── Report serialisation ─────────────────────────────────────────────────────

#[tokio::test]
async fn report_serialises_to_json() {
    let tmp = TempDir::new().unwrap();
    let folder = scans_folder(&tmp, &["a.png", "b.png"]);

    let report = run_batch_with(
        &folder,
        &BatchConfig::default(),
        Collaborators::new(Arc::new(ScriptedTranscriber::failing(&["b.png"]))),
    )
    .await
    .unwrap();

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["pages"][0]["outcome"]["status"], "written");
    assert_eq!(json["pages"][1]["outcome"]["status"], "failed");
    assert_eq!(json["pages"][1]["outcome"]["error"]["kind"], "transport");
}
