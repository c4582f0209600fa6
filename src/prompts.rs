//! Prompts for the vision engine.
//!
//! Callers can replace the base prompt via
//! [`crate::config::VisionConfig::system_prompt`]; the language hint is
//! appended either way.

use crate::config::VisionConfig;

/// Base instructions for transcribing one scanned or born-digital page.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You transcribe a single PDF page image into Markdown.

1. TEXT
   - Transcribe every piece of text on the page, in natural reading order
   - Read multi-column layouts column by column
   - Do not summarise, translate or paraphrase

2. STRUCTURE
   - Headings with #, ## and ###, following the visual hierarchy
   - Lists with - or 1. and their original nesting
   - Keep **bold** and *italic* emphasis

3. TABLES
   - Every table becomes a GFM pipe table with a header separator row
   - One Markdown row per visual row; merge wrapped cell text into one cell
   - Leave a cell empty rather than guessing its value

4. IGNORE
   - Page numbers, running headers and footers
   - Decorative rules, logos and watermarks

5. OUTPUT
   - Markdown only, with no surrounding ``` fences
   - No commentary, no "Page X" markers
   - If the page has no readable content, output nothing"#;

/// Sentence naming the expected page languages, or `None` when unset.
pub fn language_hint(languages: &[String]) -> Option<String> {
    match languages {
        [] => None,
        [one] => Some(format!(
            "The page text is expected to be in language `{one}`. Keep its accents and punctuation exactly."
        )),
        many => Some(format!(
            "The page text may be in any of these languages: {}. Keep accents and punctuation exactly.",
            many.iter()
                .map(|l| format!("`{l}`"))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

/// Full system prompt for `config`: the base prompt plus the language hint.
pub fn system_prompt(config: &VisionConfig) -> String {
    let base = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    match language_hint(&config.languages) {
        Some(hint) => format!("{base}\n\n{hint}"),
        None => base.to_string(),
    }
}
