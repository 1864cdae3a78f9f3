//! Prompt text sent with every page.
//!
//! Callers can override the default via [`crate::config::ParallexConfig::prompt_text`];
//! the constant here is used only when no override is provided.

/// Default prompt for converting one PDF page image to Markdown.
///
/// The last sentence matters to the correlator: a page the model cannot read
/// comes back as an empty string, which is kept as a valid (empty) page rather
/// than reported as missing.
pub const DEFAULT_PROMPT: &str = "Convert the following PDF page to markdown. \
Return only the markdown with no explanation text. \
Leave out any page numbers and redundant headers or footers. \
Do not include any code blocks (e.g. \"```markdown\" or \"```\") in the response. \
If unable to parse, return an empty string.";

/// The prompt to use given an optional override.
pub fn prompt_or_default(prompt: Option<&str>) -> &str {
    prompt.unwrap_or(DEFAULT_PROMPT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_asks_for_empty_on_failure() {
        assert!(DEFAULT_PROMPT.ends_with("return an empty string."));
        assert!(!DEFAULT_PROMPT.contains('\n'));
    }

    #[test]
    fn override_wins() {
        assert_eq!(prompt_or_default(Some("custom")), "custom");
        assert_eq!(prompt_or_default(None), DEFAULT_PROMPT);
    }
}
