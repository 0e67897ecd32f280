//! Deterministic cleanup of generated Markdown.
//!
//! Applied to each page a vision model returns and to text pulled out of PDFs
//! locally. Models sometimes wrap the whole answer in a ```` ```markdown ````
//! fence, emit CRLF line endings, or leak zero-width characters from the
//! source; extracted PDF text carries form feeds between pages.
//! Each rule below is a pure `&str -> String` pass; order matters only in
//! that fences are stripped before line-level rules run.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\n(.*?)\n?```\s*$").unwrap());

static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Zero-width space, ZWNJ, ZWJ, word joiner, BOM, soft hyphen.
const INVISIBLE: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'];

/// Clean one page of model output. The result ends with exactly one newline.
pub fn tidy_markdown(input: &str) -> String {
    let s = input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{000C}', "\n\n");
    let s = strip_outer_fence(&s);
    let s: String = s.chars().filter(|c| !INVISIBLE.contains(c)).collect();
    let s = s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    let s = RE_BLANK_RUNS.replace_all(&s, "\n\n");

    let trimmed = s.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}
