//! Text helpers used while rendering embedding text.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("markup pattern"))
}

fn quoted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"'([^']*)'").expect("quoted item pattern"))
}

/// Removes HTML-like tags, keeping inner text in order. Entities are left as-is.
pub fn strip_markup(input: &str) -> Cow<'_, str> {
    markup_pattern().replace_all(input, "")
}

/// Extracts every single-quoted substring, in order. No escaping is supported.
///
/// `"'a', 'b', 'c'"` yields `["a", "b", "c"]`; `"[]"` or `""` yields nothing.
pub fn parse_quoted_list(input: &str) -> Vec<String> {
    quoted_pattern()
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Drops the single quotes the exporter wraps around activity names.
pub fn strip_quotes(input: &str) -> String {
    input.replace('\'', "")
}

/// Number of characters (Unicode scalar values) in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Hard-cuts `text` to at most `max_chars` characters.
///
/// Returns the original length when a cut happened so the caller can raise a warning.
pub fn truncate_chars(mut text: String, max_chars: usize) -> (String, Option<usize>) {
    let len = char_len(&text);
    if len <= max_chars {
        return (text, None);
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    text.truncate(cut);
    (text, Some(len))
}

/// First `max_chars` characters, for log previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    let single_line: String = text
        .chars()
        .map(|ch| if ch == '\n' { ' ' } else { ch })
        .collect();
    truncate_chars(single_line, max_chars).0
}
