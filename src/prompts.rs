//! Prompts for the transcription, reformatting and translation stages.
//!
//! Callers can override the transcription prompt via
//! [`crate::config::BatchConfig::system_prompt`]; everything else is fixed.

/// Returned by the model for a page with no meaningful content.
///
/// The runner does not validate it. It only decides whether to keep the
/// sentinel in the output or leave the page out, see
/// [`crate::config::EmptyPagePolicy`].
pub const EMPTY_PAGE: &str = "EMPTY_PAGE";

/// Default system prompt for transcribing one page image.
pub const TRANSCRIBE_SYSTEM_PROMPT: &str = r#"You are a professional OCR engine. Carefully read the text in the image and extract all of it, including tables, as accurately as possible.

Keep the original formatting and structure: bold, italic, underline, tables, paragraphs and headings.
Write tables as Markdown tables and count columns carefully (an empty first cell is still a column).

Rules:
1. Extract only the text actually present in the image. Do not add explanations or commentary.
2. Keep the original language. Do not translate.
3. Preserve the layout as closely as possible, especially tables: every cell's text must be extracted.
4. Ignore purely graphical content (logos, maps, watermarks).
5. Ignore running headers and footers, but keep the printed page number exactly as it appears, even if it looks wrong.
6. Keep any emoji or special symbols that appear inline with the text.
7. If the page is blank or has no meaningful content, reply with exactly: EMPTY_PAGE"#;

/// User turn sent alongside the page image.
pub const TRANSCRIBE_USER_PROMPT: &str =
    "Transcribe this page strictly following the system instructions. Do not add any explanation.";

/// System prompt for turning raw OCR text into clean Markdown.
pub const REFORMAT_SYSTEM_PROMPT: &str = r#"You convert raw OCR output into clean Markdown. The original page image is attached for layout reference.

Rules:
1. Keep every word of the OCR text. Fix only obvious recognition errors that the image confirms.
2. Use # headings, lists, **bold** and *italic* to match what the image shows.
3. Rebuild tables as GFM pipe tables with the same number of columns as the image.
4. Output ONLY the Markdown. Do not wrap it in ``` fences and do not comment on it.
5. If the text is EMPTY_PAGE or the page has no meaningful content, reply with exactly: EMPTY_PAGE"#;

/// User turn for the reformatting stage.
pub fn reformat_user_prompt(ocr_text: &str) -> String {
    format!("OCR text of the attached page:\n\n\"\"\"{ocr_text}\"\"\"")
}

/// System prompt for translating a page's Markdown into `target_language`.
pub fn translate_system_prompt(target_language: &str) -> String {
    format!(
        "You are a professional translator. Translate the Markdown you are given into {target_language}. \
The original page image is attached for context.\n\n\
Rules:\n\
1. Keep the Markdown structure exactly: headings, lists, tables, emphasis and line breaks.\n\
2. Translate all prose, table cells included. Leave code, numbers, URLs and proper names unchanged.\n\
3. Output ONLY the translated Markdown, without fences or commentary."
    )
}

/// User turn for the translation stage.
pub fn translate_user_prompt(markdown: &str) -> String {
    format!("Markdown to translate:\n\n\"\"\"{markdown}\"\"\"")
}

/// `true` when `text` is the blank-page sentinel, ignoring surrounding whitespace.
pub fn is_empty_page(text: &str) -> bool {
    text.trim() == EMPTY_PAGE
}
