//! CLI binary for edgequake-img2md.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `BatchConfig`, runs the batch and prints the summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_img2md::{
    run_batch, BatchConfig, BatchProgressCallback, BatchReport, EmptyPagePolicy, ProgressCallback,
    ProviderKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

/// Keep one-line error messages readable.
fn shorten(error: &str) -> String {
    if error.chars().count() > 80 {
        let cut: String = error.chars().take(79).collect();
        format!("{cut}\u{2026}")
    } else {
        error.to_string()
    }
}

// ── Progress: indicatif bar ──────────────────────────────────────────────────

/// Live progress bar with one log line per finished image.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Transcribing");
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for BarProgress {
    fn on_batch_start(&self, total: usize, output: &Path) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}  {} {}",
            cyan("◆"),
            bold(&format!("{total} images to process")),
            dim("→"),
            output.display()
        ));
    }

    fn on_page_start(&self, _index: usize, _total: usize, file_name: &str) {
        self.bar.set_message(file_name.to_string());
    }

    fn on_page_complete(&self, index: usize, total: usize, file_name: &str, chars: usize) {
        self.bar
            .println(completed_line(index, total, file_name, chars));
        self.bar.inc(1);
    }

    fn on_page_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            file_name,
            red(&shorten(error)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

/// One finished image; a page with nothing written is shown as skipped.
fn completed_line(index: usize, total: usize, file_name: &str, chars: usize) -> String {
    let (mark, detail) = if chars == 0 {
        (dim("–"), dim("skipped"))
    } else {
        (green("✓"), dim(&format!("{chars:>5} chars")))
    };
    format!("  {mark} {index:>3}/{total:<3}  {file_name}  {detail}")
}

// ── Progress: plain lines ────────────────────────────────────────────────────

/// `Processing i / N: name` lines on stderr, for logs and dumb terminals.
struct LineProgress;

impl BatchProgressCallback for LineProgress {
    fn on_batch_start(&self, total: usize, output: &Path) {
        eprintln!("{total} images to process...");
        eprintln!("Writing Markdown to {}", output.display());
    }

    fn on_page_start(&self, index: usize, total: usize, file_name: &str) {
        eprintln!("Processing {index} / {total}: {file_name}");
    }

    fn on_page_error(&self, _index: usize, _total: usize, file_name: &str, error: &str) {
        eprintln!("  Failed {file_name}: {error}");
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe every png/jpg/jpeg in ./scans → ./scans_<timestamp>.md
  img2md ./scans

  # Local OpenAI-compatible server (vLLM, LM Studio, Ollama /v1)
  BASE_URL=http://localhost:8000/v1/chat/completions MODEL_FOR_OCR=qwen2.5-vl img2md ./scans

  # Native Ollama API
  img2md --provider ollama --model llama3.2-vision ./scans

  # Hosted provider through edgequake-llm (uses OPENAI_API_KEY)
  img2md --provider openai --model gpt-4.1-mini ./scans

  # Reformat raw OCR into Markdown, then translate → also ./scans_<timestamp>_English.md
  img2md --reformat --trans-to English ./scans

ENVIRONMENT VARIABLES (also read from ./.env):
  BASE_URL                Endpoint URL (OpenAI-compatible or Ollama provider)
  MODEL_FOR_OCR           Transcription model
  MODEL_FOR_FORMAT        Reformatting model (default: MODEL_FOR_OCR)
  MODEL_FOR_TRANSLATION   Translation model (default: MODEL_FOR_FORMAT)
  API_KEY_FOR_OCR         Bearer token for the endpoint
  TIMEOUT_FOR_OCR         Per-call timeout in seconds (default: 120)
  IMG2MD_PROVIDER         openai-compatible (default), ollama, or an edgequake-llm provider name
  RUST_LOG                Overrides the log filter
"#;

/// Convert a folder of page images to one Markdown file using vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "img2md",
    version,
    about = "Convert a folder of page images (PNG or JPG) to one Markdown file using vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder containing the page images.
    img_folder: PathBuf,

    /// Translate every page into this language and write a second file.
    #[arg(long, visible_alias = "trans_to", env = "IMG2MD_TRANS_TO")]
    trans_to: Option<String>,

    /// Pass the raw OCR text through a second call that rebuilds Markdown.
    #[arg(long, env = "IMG2MD_REFORMAT")]
    reformat: bool,

    /// Back end: openai-compatible, ollama, or an edgequake-llm provider (openai, anthropic, gemini…).
    #[arg(long, env = "IMG2MD_PROVIDER", default_value = "openai-compatible")]
    provider: String,

    /// Endpoint URL. Defaults to the provider's local default.
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Transcription model.
    #[arg(long, env = "MODEL_FOR_OCR")]
    model: Option<String>,

    /// Reformatting model.
    #[arg(long, env = "MODEL_FOR_FORMAT")]
    format_model: Option<String>,

    /// Translation model.
    #[arg(long, env = "MODEL_FOR_TRANSLATION")]
    translate_model: Option<String>,

    /// Bearer token sent to the endpoint.
    #[arg(long, env = "API_KEY_FOR_OCR", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-call timeout in seconds.
    #[arg(long, env = "TIMEOUT_FOR_OCR", default_value_t = 120)]
    timeout: u64,

    /// Leave out pages the model reports as EMPTY_PAGE instead of writing the marker.
    #[arg(long, env = "IMG2MD_SKIP_EMPTY_PAGES")]
    skip_empty_pages: bool,

    /// Write model output verbatim, without post-processing.
    #[arg(long)]
    no_clean: bool,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "IMG2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens per call.
    #[arg(long, env = "IMG2MD_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Path to a text file with a custom transcription system prompt.
    #[arg(long, env = "IMG2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the batch report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Plain progress lines instead of a progress bar.
    #[arg(long, env = "IMG2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A .env in the working directory feeds the clap `env` fallbacks below;
    // variables already set in the process win.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would tear through the progress bar; the bar carries that
    // information already.
    let show_bar = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_bar {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if cli.quiet {
        None
    } else if show_bar {
        Some(BarProgress::new() as ProgressCallback)
    } else {
        Some(Arc::new(LineProgress) as ProgressCallback)
    };
    let config = build_config(&cli, progress).await?;

    if !cli.quiet {
        eprintln!(
            "Using model '{}' via {}",
            config.model,
            match &config.provider {
                ProviderKind::Factory(name) => name.clone(),
                _ => config.endpoint().to_string(),
            }
        );
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = run_batch(&cli.img_folder, &config)
        .await
        .context("Batch failed")?;

    if report.is_empty() {
        if !cli.quiet {
            eprintln!(
                "No images found in {}. Supported formats: png, jpg, jpeg.",
                report.folder.display()
            );
        }
        return Ok(());
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    }

    if !cli.quiet {
        print_summary(&report);
    }
    Ok(())
}

/// End-of-run summary on stderr.
fn print_summary(report: &BatchReport) {
    let failed = report.failed_files();
    eprintln!(
        "{}  {}/{} images written  {}ms",
        if failed.is_empty() {
            green("✔")
        } else {
            cyan("⚠")
        },
        report.written(),
        report.total(),
        report.duration_ms,
    );
    if report.skipped() > 0 {
        eprintln!("   {} skipped (no content)", report.skipped());
    }
    if !failed.is_empty() {
        eprintln!(
            "   {} failed: {}",
            red(&failed.len().to_string()),
            failed.join(", ")
        );
    }
    if !report.translation_failures.is_empty() {
        eprintln!(
            "   {} translation(s) failed: {}",
            red(&report.translation_failures.len().to_string()),
            report.translation_failures.join(", ")
        );
    }
    if let Some(path) = &report.output_path {
        eprintln!("   Markdown saved to {}", bold(&path.display().to_string()));
    }
    if let Some(path) = &report.translated_path {
        eprintln!("   Translation saved to {}", bold(&path.display().to_string()));
    }
}

/// Map CLI args to `BatchConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .provider(ProviderKind::parse(&cli.provider))
        .timeout_secs(cli.timeout)
        .reformat(cli.reformat)
        .clean_output(!cli.no_clean)
        .temperature(cli.temperature)
        .empty_pages(if cli.skip_empty_pages {
            EmptyPagePolicy::Skip
        } else {
            EmptyPagePolicy::Keep
        });

    if let Some(ref url) = cli.base_url {
        builder = builder.api_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref model) = cli.format_model {
        builder = builder.format_model(model);
    }
    if let Some(ref model) = cli.translate_model {
        builder = builder.translate_model(model);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref lang) = cli.trans_to {
        builder = builder.target_language(lang);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
