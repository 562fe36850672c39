//! Case-insensitive keyword matching with fixed-radius context snippets.
//!
//! Keywords are matched literally unless the caller opts into
//! [`MatchMode::Regex`], in which case the keyword is handed to the regex
//! engine as-is. Snippet offsets are measured in characters and clamped to the
//! text, so a snippet never splits a multi-byte character.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::models::{KeywordMatches, Snippet};

/// Characters of context kept on each side of a match.
pub const DEFAULT_SNIPPET_RADIUS: usize = 50;

/// How a keyword is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Special characters are escaped; `c++` matches the text `c++`.
    #[default]
    Literal,
    /// The keyword is a raw regular expression.
    Regex,
}

/// Split a comma-delimited keyword string into trimmed, non-empty keywords.
///
/// Order is preserved and repeated keywords are kept once.
pub fn parse_keywords(input: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for raw in input.split(',') {
        let keyword = raw.trim();
        if keyword.is_empty() || keywords.iter().any(|k| k == keyword) {
            continue;
        }
        keywords.push(keyword.to_string());
    }
    keywords
}

/// Build the case-insensitive matcher for a keyword.
pub fn compile_pattern(pattern: &str, mode: MatchMode) -> Result<Regex, regex::Error> {
    let source = match mode {
        MatchMode::Literal => regex::escape(pattern),
        MatchMode::Regex => pattern.to_string(),
    };
    RegexBuilder::new(&source).case_insensitive(true).build()
}

/// Literal, case-insensitive search with the default snippet radius.
pub fn find_matches(pattern: &str, text: &str) -> Vec<Snippet> {
    match compile_pattern(pattern, MatchMode::Literal) {
        Ok(re) => find_matches_with(&re, text, DEFAULT_SNIPPET_RADIUS),
        // escaped patterns only fail on size limits
        Err(_) => Vec::new(),
    }
}

/// Collect a snippet for every non-overlapping match of `re` in `text`.
///
/// Zero-width matches are skipped. Returns an empty vector for empty text.
pub fn find_matches_with(re: &Regex, text: &str, radius: usize) -> Vec<Snippet> {
    if text.is_empty() {
        return Vec::new();
    }

    // Matches arrive in order, so char offsets advance with a running cursor.
    let mut cursor_byte = 0;
    let mut cursor_char = 0;
    let mut snippets = Vec::new();

    for m in re.find_iter(text) {
        if m.start() == m.end() {
            continue;
        }
        let match_start = cursor_char + text[cursor_byte..m.start()].chars().count();
        let match_end = match_start + m.as_str().chars().count();
        cursor_byte = m.end();
        cursor_char = match_end;

        let start_byte = step_back(text, m.start(), radius);
        let end_byte = step_forward(text, m.end(), radius);
        let start = match_start - text[start_byte..m.start()].chars().count();
        let end = match_end + text[m.end()..end_byte].chars().count();

        snippets.push(Snippet {
            text: text[start_byte..end_byte].to_string(),
            start,
            end,
            match_start,
            match_end,
            matched: m.as_str().to_string(),
        });
    }

    snippets
}

/// Search one keyword in one document, folding compile errors into the result.
pub fn search_keyword(keyword: &str, text: &str, mode: MatchMode, radius: usize) -> KeywordMatches {
    match compile_pattern(keyword, mode) {
        Ok(re) => {
            let snippets = find_matches_with(&re, text, radius);
            KeywordMatches {
                keyword: keyword.to_string(),
                count: snippets.len(),
                snippets,
                error: None,
            }
        }
        Err(e) => KeywordMatches {
            keyword: keyword.to_string(),
            count: 0,
            snippets: Vec::new(),
            error: Some(format!("invalid pattern: {}", e)),
        },
    }
}

/// Byte offset `chars` characters before `byte`, or 0.
fn step_back(text: &str, byte: usize, chars: usize) -> usize {
    text[..byte]
        .char_indices()
        .rev()
        .take(chars)
        .last()
        .map_or(byte, |(i, _)| i)
}

/// Byte offset `chars` characters after `byte`, or the end of the text.
fn step_forward(text: &str, byte: usize, chars: usize) -> usize {
    text[byte..]
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(i, _)| byte + i)
}
