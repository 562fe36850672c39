//! Sentence-boundary text segmenter.
//!
//! Splits extracted document text into [`Chunk`]s that fit a character
//! budget. Sentences are found with the literal delimiter `". "` and are never
//! split: a sentence longer than the budget becomes its own oversized chunk.
//!
//! Joining the returned chunks with `". "` reproduces the input exactly.

use crate::models::Chunk;

/// Sentence delimiter used both for splitting and rejoining.
pub const SENTENCE_DELIMITER: &str = ". ";

/// Default chunk budget in characters.
pub const DEFAULT_SEGMENT_CHARS: usize = 1000;

/// Split text into sentence-aligned chunks of at most `target_chars`
/// characters.
///
/// Sentences are appended greedily while the joined length stays within the
/// budget. Empty sentence candidates (from `". . "` runs or a leading or
/// trailing delimiter) are absorbed into the running chunk so no chunk is
/// ever empty; each one absorbed may carry the chunk past the budget by one
/// delimiter. Empty text yields no chunks.
pub fn segment(text: &str, target_chars: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let delimiter_len = SENTENCE_DELIMITER.chars().count();
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut started = false;

    for sentence in text.split(SENTENCE_DELIMITER) {
        let sentence_len = sentence.chars().count();

        if !started {
            current.push_str(sentence);
            current_len = sentence_len;
            started = true;
            continue;
        }

        let joined_len = current_len + delimiter_len + sentence_len;
        let fits = joined_len <= target_chars;
        if fits || sentence.is_empty() || current.is_empty() {
            current.push_str(SENTENCE_DELIMITER);
            current.push_str(sentence);
            current_len = joined_len;
        } else {
            chunks.push(Chunk {
                index: chunks.len(),
                text: std::mem::take(&mut current),
            });
            current.push_str(sentence);
            current_len = sentence_len;
        }
    }

    if started {
        chunks.push(Chunk {
            index: chunks.len(),
            text: current,
        });
    }

    chunks
}

/// Rejoin chunks into the text they were cut from.
pub fn reassemble(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(SENTENCE_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(segment("", 1000).is_empty());
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = segment("Hello, world. How are you", 1000);
        assert_eq!(texts(&chunks), vec!["Hello, world. How are you"]);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn greedy_packing_respects_budget() {
        // "aaaa. bbbb" is 10 chars
        let chunks = segment("aaaa. bbbb. cccc. dddd. e", 10);
        assert_eq!(texts(&chunks), vec!["aaaa. bbbb", "cccc. dddd", "e"]);
    }

    #[test]
    fn oversized_sentence_is_its_own_chunk() {
        let long = "x".repeat(30);
        let text = format!("short. {}. tail", long);
        let chunks = segment(&text, 10);
        assert_eq!(texts(&chunks), vec!["short", long.as_str(), "tail"]);
    }

    #[test]
    fn text_without_delimiter_is_one_chunk() {
        let text = "y".repeat(5000);
        let chunks = segment(&text, 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_len(), 5000);
    }

    #[test]
    fn empty_candidates_never_form_chunks() {
        for text in [". ", "abc. ", ". abc", "abc. . def", "abc. . . def. "] {
            for size in 1..8 {
                let chunks = segment(text, size);
                assert!(chunks.iter().all(|c| !c.text.is_empty()), "{:?} @ {}", text, size);
                assert_eq!(reassemble(&chunks), text);
            }
        }
    }

    #[test]
    fn reconstruction_and_size_bound_hold() {
        let text = (0..200)
            .map(|i| format!("Sentence number {} talks about item {}", i, i * 7))
            .collect::<Vec<_>>()
            .join(". ");
        for size in [1, 10, 37, 80, 250, 1000, 100_000] {
            let chunks = segment(&text, size);
            assert_eq!(reassemble(&chunks), text, "size {}", size);
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.index, i);
                assert!(!c.text.is_empty());
                assert!(within_budget(c, size), "size {}", size);
            }
        }

        // Absorbed empty candidates are the one way a multi-sentence chunk
        // exceeds the budget: by one delimiter each.
        let chunks = segment("aaaa. . bbbb", 4);
        assert_eq!(texts(&chunks), vec!["aaaa. ", "bbbb"]);
        assert_eq!(reassemble(&chunks), "aaaa. . bbbb");
        assert_eq!(chunks[0].char_len(), 6);

        let chunks = segment("aa. bb. . cc", 6);
        assert_eq!(texts(&chunks), vec!["aa. bb. ", "cc"]);
        assert_eq!(chunks[0].char_len(), 8);
        assert!(chunks.iter().all(|c| within_budget(c, 6)));
    }

    /// Over budget only by absorbed empty candidates, or a lone long sentence.
    fn within_budget(chunk: &Chunk, size: usize) -> bool {
        let parts: Vec<&str> = chunk.text.split(SENTENCE_DELIMITER).collect();
        let empty = parts.iter().filter(|p| p.is_empty()).count();
        let sentences = parts.len() - empty;
        chunk.char_len() <= size + empty * SENTENCE_DELIMITER.len() || sentences <= 1
    }

    #[test]
    fn budget_counts_characters() {
        // each sentence is 4 chars but 8 bytes
        let chunks = segment("éééé. üüüü", 10);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn deterministic() {
        let text = "Alpha. Beta. Gamma. Delta. Epsilon";
        assert_eq!(segment(text, 12), segment(text, 12));
    }
}
