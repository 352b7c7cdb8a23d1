//! Pass/fail criteria applied to step output.
//!
//! A criterion is either empty (always passes), an inline regular expression
//! written as `/pattern/flags`, or a literal substring.

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Flags accepted after the closing `/`.
///
/// `g` is accepted and ignored, `y` anchors the match at the start of the output.
pub const REGEX_FLAGS: &str = "imsxUuRgy";

/// A parsed criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion<'a> {
    /// Empty or whitespace-only criteria.
    Always,
    /// `/pattern/flags`.
    Pattern {
        /// Source between the delimiters.
        pattern: &'a str,
        /// Flag characters after the closing delimiter.
        flags: &'a str,
    },
    /// Case-sensitive substring.
    Literal(&'a str),
}

impl<'a> Criterion<'a> {
    /// Classifies a criteria string.
    pub fn parse(criteria: &'a str) -> Self {
        if criteria.trim().is_empty() {
            return Criterion::Always;
        }
        match split_pattern(criteria) {
            Some((pattern, flags)) => Criterion::Pattern { pattern, flags },
            None => Criterion::Literal(criteria),
        }
    }

    /// Returns whether `output` satisfies the criterion.
    ///
    /// A pattern that does not compile never matches.
    pub fn matches(&self, output: &str) -> bool {
        match self {
            Criterion::Always => true,
            Criterion::Literal(needle) => output.contains(needle),
            Criterion::Pattern { pattern, flags } => match compile(pattern, flags) {
                Ok((regex, sticky)) => {
                    if sticky {
                        regex.find(output).is_some_and(|m| m.start() == 0)
                    } else {
                        regex.is_match(output)
                    }
                }
                Err(reason) => {
                    debug!("Criterion /{}/{} rejected: {}", pattern, flags, reason);
                    false
                }
            },
        }
    }
}

/// Returns whether `output` satisfies `criteria`.
///
/// # Examples
///
/// ```
/// use kusari_core::validate;
///
/// assert!(validate("anything", ""));
/// assert!(validate("abc123", r"/\d+/"));
/// assert!(!validate("abc", r"/\d+/"));
/// assert!(validate("Hello World", "/hello/i"));
/// assert!(validate("hello world", "hello"));
/// assert!(!validate("hello", "/[/"));
/// ```
pub fn validate(output: &str, criteria: &str) -> bool {
    Criterion::parse(criteria).matches(output)
}

fn split_pattern(criteria: &str) -> Option<(&str, &str)> {
    let body = criteria.strip_prefix('/')?;
    let close = body.rfind('/')?;
    let (pattern, flags) = (&body[..close], &body[close + 1..]);

    if !flags.chars().all(|c| REGEX_FLAGS.contains(c)) {
        return None;
    }
    let escapes = pattern.chars().rev().take_while(|c| *c == '\\').count();
    if escapes % 2 == 1 {
        return None;
    }
    Some((pattern, flags))
}

fn compile(pattern: &str, flags: &str) -> Result<(Regex, bool), String> {
    let mut builder = RegexBuilder::new(pattern);
    let mut sticky = false;
    let mut seen = String::with_capacity(flags.len());

    for flag in flags.chars() {
        if seen.contains(flag) {
            return Err(format!("duplicate flag '{}'", flag));
        }
        seen.push(flag);
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'U' => {
                builder.swap_greed(true);
            }
            'u' => {
                builder.unicode(true);
            }
            'R' => {
                builder.crlf(true);
            }
            'y' => sticky = true,
            _ => {}
        }
    }

    builder
        .build()
        .map(|regex| (regex, sticky))
        .map_err(|e| e.to_string())
}
