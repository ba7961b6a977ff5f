//! Post-processing: deterministic cleanup of model output before it is written.
//!
//! Vision models are told not to fence their answer or pad it, and they do
//! it anyway often enough to matter. Each page is appended to a shared file
//! with a blank-line separator, so stray fences or trailing blank lines from
//! one page would leak into the next.
//!
//! Rules, applied in order:
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Strip an outer ```` ```markdown ```` / ```` ``` ```` fence around the whole answer
//! 3. Drop invisible Unicode (zero-width spaces, BOM, soft hyphens, word joiners)
//! 4. Trim trailing whitespace on every line
//! 5. Collapse runs of blank lines down to one
//! 6. Trim leading and trailing blank lines
//!
//! The blank-page sentinel passes through unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of model output.
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fence(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_line_ends(&s);
    let s = collapse_blank_runs(&s);
    s.trim_matches('\n').to_string()
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A\s*```[ \t]*(?:markdown|md)?[ \t]*\n(.*?)\n[ \t]*```\s*\z")
        .expect("outer fence regex is valid")
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input) {
        // A fenced answer that itself contains fences is real code, not a wrapper.
        Some(caps) if !caps[1].contains("```") => caps[1].to_string(),
        _ => input.to_string(),
    }
}

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

fn remove_invisible_chars(input: &str) -> String {
    input.replace(INVISIBLE, "")
}

fn trim_line_ends(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run regex is valid"));

fn collapse_blank_runs(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}
