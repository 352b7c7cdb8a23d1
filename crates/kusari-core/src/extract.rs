//! Narrowing of step output into the context carried to the next step.

use once_cell::sync::Lazy;
use regex::Regex;

// Opening fence with an optional language tag, lazy body, and a closing fence.
// One newline right before the closing fence belongs to the fence, not the body.
#[allow(clippy::expect_used)]
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[\w.+#-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("fenced block pattern is valid")
});

/// Reduces `output` to the content of its fenced code blocks.
///
/// Blocks are joined by a blank line in order of appearance. When there are no
/// complete blocks the output is returned unchanged.
///
/// # Examples
///
/// ```
/// use kusari_core::extract_context;
///
/// assert_eq!(extract_context("no fences here"), "no fences here");
/// assert_eq!(
///     extract_context("pre ```js\ncode1\n``` post ```\ncode2\n```"),
///     "code1\n\ncode2"
/// );
/// ```
pub fn extract_context(output: &str) -> String {
    let blocks: Vec<&str> = FENCED_BLOCK
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();

    if blocks.is_empty() {
        output.to_string()
    } else {
        blocks.join("\n\n")
    }
}
