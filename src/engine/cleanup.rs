//! Deterministic cleanup of engine Markdown before it becomes `page_content`.
//!
//! Rules, in order (line endings first so later rules see `\n` only):
//! 1. CRLF / CR → LF
//! 2. strip a fence wrapping the whole page (```` ```markdown ````)
//! 3. drop invisible Unicode (zero-width, BOM, soft hyphen)
//! 4. trim trailing whitespace per line
//! 5. keep only the header separator row of each pipe table
//! 6. collapse runs of blank lines to one
//! 7. trim the page; an empty page stays empty

use once_cell::sync::Lazy;
use regex::Regex;

static RE_WRAPPING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\n(.*?)\n?```$").unwrap());

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

/// Normalise engine output into stored page text.
pub fn clean_markdown(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = unwrap_fence(text.trim());
    let text = text.replace(INVISIBLE, "");
    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let text = drop_body_separators(&text);
    RE_BLANK_RUN.replace_all(&text, "\n\n").trim().to_string()
}

fn unwrap_fence(text: &str) -> String {
    match RE_WRAPPING_FENCE.captures(text) {
        Some(caps) => caps[1].to_string(),
        None => text.to_string(),
    }
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    is_table_row(line)
        && line.contains('-')
        && line
            .trim()
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// GFM allows a separator only as a table's second row.
fn drop_body_separators(text: &str) -> String {
    let mut kept = Vec::new();
    let mut row = 0usize;
    for line in text.lines() {
        if is_table_row(line) {
            row += 1;
            if row != 2 && is_separator_row(line) {
                continue;
            }
        } else {
            row = 0;
        }
        kept.push(line);
    }
    kept.join("\n")
}
