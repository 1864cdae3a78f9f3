//! Post-processing: deterministic cleanup of model-generated Markdown.
//!
//! Even when told not to, models occasionally wrap a page in
//! ` ```markdown ... ``` ` fences or answer with Windows line endings. The
//! rules here undo that without touching content. They run per page, after
//! correlation, and only when [`crate::config::ParallexConfig::clean_output`]
//! is set.
//!
//! An empty page stays empty: the prompt asks for an empty string when a page
//! cannot be read, and that answer is kept as-is.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of model output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer markdown fences
/// 3. Trim trailing whitespace per line
pub fn clean_output(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }
    let s = normalise_line_endings(input);
    let s = strip_markdown_fences(&s);
    trim_trailing_whitespace(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*?)\n?```$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}
