//! Line-oriented parser for numbered suggestion lists.
//!
//! Only lines that start with an ordinal marker (`1.`, `2)`, ...) are
//! candidates. Anything else, such as a preamble or a closing remark, is
//! ignored.

/// Suggestions kept from one model answer
pub const MAX_SUGGESTIONS: usize = 3;

/// Text after the ordinal marker, if `line` starts with one.
fn strip_ordinal(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let rest = rest
        .strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))?;
    // "1.5 million" is a number, not a marker.
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest)
}

fn strip_quotes(text: &str) -> &str {
    const QUOTES: &[char] = &['"', '\'', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}', '`'];
    text.trim_matches(|c: char| QUOTES.contains(&c) || c.is_whitespace())
}

fn strip_emphasis(text: &str) -> &str {
    text.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
}

/// Parse one candidate line; `None` when it is not a usable numbered entry.
pub fn parse_numbered_line(line: &str) -> Option<String> {
    let line = strip_emphasis(line.trim());
    let body = strip_ordinal(line)?;
    let body = strip_quotes(strip_emphasis(body));
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// Collect at most [`MAX_SUGGESTIONS`] numbered entries, in order.
pub fn parse_numbered_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(parse_numbered_line)
        .take(MAX_SUGGESTIONS)
        .collect()
}
