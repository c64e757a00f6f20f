//! Context assembly under a character budget.
//!
//! Ranked passages are appended best-first, separated by a blank line. Words a
//! passage shares with an already included passage of the same source (the
//! chunk overlap window) are emitted only once. The first passage that does
//! not fit is cut at a word boundary and ends the walk, so lower-ranked text
//! never displaces higher-ranked text.

use tracing::debug;

use tutor_core::types::{ContextResult, ContextSource, Passage, ScoredPassage};

const SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl ContextAssembler {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Concatenate `ranked` (descending score order) into one context block.
    ///
    /// Returns `None` when there is nothing to assemble. Otherwise the result's
    /// text, separators included, is at most `max_chars` characters long.
    pub fn assemble(&self, ranked: &[ScoredPassage]) -> Option<ContextResult> {
        if ranked.is_empty() {
            return None;
        }

        let mut result = ContextResult::default();
        let mut used = 0usize;
        let separator_len = SEPARATOR.chars().count();

        for scored in ranked {
            let passage = &scored.passage;
            let Some((start_word, end_word, text)) = uncovered_text(passage, &result.sources)
            else {
                debug!(
                    source_id = %passage.source_id,
                    chunk = passage.chunk_index,
                    "Passage already covered, deduplicated"
                );
                continue;
            };

            let sep = if result.sources.is_empty() { 0 } else { separator_len };
            let remaining = self.max_chars.saturating_sub(used + sep);
            let len = text.chars().count();

            let (piece, truncated) = if len <= remaining {
                (text.as_str(), false)
            } else {
                (truncate_at_word(&text, remaining), true)
            };

            if !piece.is_empty() {
                if sep > 0 {
                    result.text.push_str(SEPARATOR);
                }
                result.text.push_str(piece);
                used += sep + piece.chars().count();
                let end_word = if truncated {
                    start_word + piece.split_whitespace().count()
                } else {
                    end_word
                };
                result.sources.push(ContextSource {
                    source_id: passage.source_id.clone(),
                    chunk_index: passage.chunk_index,
                    score: scored.score,
                    start_word,
                    end_word,
                    text: piece.to_string(),
                    truncated,
                });
            }

            if truncated {
                break;
            }
        }

        Some(result)
    }
}

/// The words of `passage` not already covered by an included passage of the
/// same source, as `(start_word, end_word, text)`.
///
/// Overlap is removed from either end of the passage's word range; a passage
/// lying entirely inside included ranges yields `None`. Passages whose text
/// does not match their word range are taken whole.
fn uncovered_text(
    passage: &Passage,
    included: &[ContextSource],
) -> Option<(usize, usize, String)> {
    let words: Vec<&str> = passage.text.split_whitespace().collect();
    if words.len() != passage.word_count() {
        return Some((passage.start_word, passage.end_word, passage.text.clone()));
    }

    let (mut start, mut end) = (passage.start_word, passage.end_word);
    let same_source: Vec<&ContextSource> = included
        .iter()
        .filter(|s| s.source_id == passage.source_id)
        .collect();

    // Clipping one end can expose it to another included range; repeat until
    // stable.
    loop {
        let before = (start, end);
        for prior in &same_source {
            if prior.start_word <= start && start < prior.end_word {
                start = prior.end_word;
            }
            if prior.start_word < end && end <= prior.end_word {
                end = prior.start_word;
            }
        }
        if start >= end {
            return None;
        }
        if (start, end) == before {
            break;
        }
    }

    let offset = passage.start_word;
    Some((start, end, words[start - offset..end - offset].join(" ")))
}

/// Longest prefix of `text` with at most `max_chars` characters that does not
/// end inside a word. Trailing whitespace is removed.
fn truncate_at_word(text: &str, max_chars: usize) -> &str {
    let cut = match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => byte_idx,
        None => return text,
    };

    let prefix = &text[..cut];
    if text[cut..].starts_with(char::is_whitespace) {
        return prefix.trim_end();
    }
    match prefix.rfind(char::is_whitespace) {
        Some(boundary) => prefix[..boundary].trim_end(),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Passage whose word range cannot overlap any other index of the source.
    fn scored(source: &str, index: usize, text: &str, score: f64) -> ScoredPassage {
        let start_word = index * 1000;
        ScoredPassage {
            passage: Passage {
                source_id: source.to_string(),
                chunk_index: index,
                start_word,
                end_word: start_word + text.split_whitespace().count(),
                text: text.to_string(),
            },
            score,
        }
    }

    /// Window `[start, end)` of a document whose words are `w0 w1 w2 ...`.
    fn window(source: &str, index: usize, start: usize, end: usize, score: f64) -> ScoredPassage {
        let text = (start..end)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        ScoredPassage {
            passage: Passage {
                source_id: source.to_string(),
                chunk_index: index,
                start_word: start,
                end_word: end,
                text,
            },
            score,
        }
    }

    fn ranges(result: &ContextResult) -> Vec<(usize, usize)> {
        result
            .sources
            .iter()
            .map(|s| (s.start_word, s.end_word))
            .collect()
    }

    #[test]
    fn test_empty_input_is_none() {
        assert_eq!(ContextAssembler::new(100).assemble(&[]), None);
    }

    #[test]
    fn test_everything_fits() {
        let ranked = vec![
            scored("a.txt", 1, "alpha beta", 0.9),
            scored("b.txt", 0, "gamma", 0.6),
        ];
        let result = ContextAssembler::new(100).assemble(&ranked).unwrap();

        assert_eq!(result.text, "alpha beta\n\ngamma");
        let provenance: Vec<_> = result.provenance().collect();
        assert_eq!(provenance, vec![("a.txt", 1, 0.9), ("b.txt", 0, 0.6)]);
        assert!(result.sources.iter().all(|s| !s.truncated));
    }

    #[test]
    fn test_exact_budget_fits_without_truncation() {
        // "alpha beta" (10) + "\n\n" (2) + "gamma" (5) = 17
        let ranked = vec![
            scored("a.txt", 0, "alpha beta", 0.9),
            scored("a.txt", 1, "gamma", 0.8),
        ];
        let result = ContextAssembler::new(17).assemble(&ranked).unwrap();
        assert_eq!(result.char_len(), 17);
        assert_eq!(result.sources.len(), 2);
    }

    #[test]
    fn test_truncates_at_word_boundary_and_stops() {
        let ranked = vec![
            scored("a.txt", 0, "one two", 0.9),
            scored("a.txt", 1, "three four five six", 0.8),
            scored("b.txt", 0, "x", 0.7),
        ];
        // 7 used + 2 separator leaves 12: "three four f" -> "three four".
        let result = ContextAssembler::new(21).assemble(&ranked).unwrap();

        assert_eq!(result.text, "one two\n\nthree four");
        assert_eq!(result.sources.len(), 2);
        assert!(result.sources[1].truncated);
        assert_eq!(result.sources[1].text, "three four");
    }

    #[test]
    fn test_lower_ranked_passages_dropped_even_if_they_fit() {
        let ranked = vec![
            scored("a.txt", 0, "short", 0.9),
            scored("a.txt", 1, "a considerably longer passage", 0.8),
            scored("b.txt", 0, "tiny", 0.7),
        ];
        let result = ContextAssembler::new(20).assemble(&ranked).unwrap();
        assert!(!result.text.contains("tiny"));
        assert_eq!(result.sources.last().unwrap().source_id, "a.txt");
    }

    #[test]
    fn test_adjacent_chunk_overlap_emitted_once() {
        // Chunk 1 ranks first; chunk 0 keeps only the words before the overlap.
        let ranked = vec![
            window("bio.txt", 1, 4, 10, 0.9),
            window("bio.txt", 0, 0, 6, 0.8),
        ];
        let result = ContextAssembler::new(1000).assemble(&ranked).unwrap();

        assert_eq!(result.text, "w4 w5 w6 w7 w8 w9\n\nw0 w1 w2 w3");
        assert_eq!(ranges(&result), vec![(4, 10), (0, 4)]);
        assert_eq!(result.text.matches("w5 ").count(), 1);
        assert!(result.sources.iter().all(|s| !s.truncated));
    }

    #[test]
    fn test_overlap_removed_from_both_neighbours() {
        let ranked = vec![
            window("bio.txt", 1, 3, 9, 0.9),
            window("bio.txt", 0, 0, 6, 0.8),
            window("bio.txt", 2, 6, 12, 0.7),
        ];
        let result = ContextAssembler::new(1000).assemble(&ranked).unwrap();
        assert_eq!(ranges(&result), vec![(3, 9), (0, 3), (9, 12)]);

        let mut words: Vec<&str> = result.text.split_whitespace().collect();
        words.sort();
        words.dedup();
        assert_eq!(words.len(), 12);
        assert_eq!(result.text.split_whitespace().count(), 12);
    }

    #[test]
    fn test_fully_covered_window_is_skipped() {
        // Near-identical tail window: [2, 8) lies inside [0, 8).
        let ranked = vec![
            window("bio.txt", 0, 0, 8, 0.9),
            window("bio.txt", 1, 2, 8, 0.85),
            window("chem.txt", 0, 0, 2, 0.5),
        ];
        let result = ContextAssembler::new(1000).assemble(&ranked).unwrap();

        let provenance: Vec<_> = result.provenance().map(|(s, c, _)| (s, c)).collect();
        assert_eq!(provenance, vec![("bio.txt", 0), ("chem.txt", 0)]);
        assert_eq!(result.text, "w0 w1 w2 w3 w4 w5 w6 w7\n\nw0 w1");
    }

    #[test]
    fn test_same_range_in_other_source_is_kept() {
        let ranked = vec![
            window("a.txt", 0, 0, 3, 0.9),
            window("b.txt", 0, 0, 3, 0.8),
        ];
        let result = ContextAssembler::new(1000).assemble(&ranked).unwrap();
        assert_eq!(result.text, "w0 w1 w2\n\nw0 w1 w2");
        assert_eq!(result.sources.len(), 2);
    }

    #[test]
    fn test_dedup_frees_budget_for_lower_ranked_passage() {
        // Without dedup chunk 0 would need 17 chars ("w0 w1 w2 w3 w4 w5")
        // and overflow; stripped to "w0 w1 w2" it fits and "x" still follows.
        let ranked = vec![
            window("bio.txt", 1, 3, 6, 0.9),
            window("bio.txt", 0, 0, 6, 0.8),
            scored("z.txt", 0, "x", 0.7),
        ];
        // "w3 w4 w5" (8) + 2 + "w0 w1 w2" (8) + 2 + "x" (1) = 21
        let result = ContextAssembler::new(21).assemble(&ranked).unwrap();
        assert_eq!(result.text, "w3 w4 w5\n\nw0 w1 w2\n\nx");
        assert!(result.sources.iter().all(|s| !s.truncated));
    }

    #[test]
    fn test_truncated_range_counts_kept_words() {
        let ranked = vec![window("bio.txt", 0, 10, 20, 0.9)];
        // "w10 w11 w12" is 11 chars; the budget cuts inside "w13".
        let result = ContextAssembler::new(13).assemble(&ranked).unwrap();
        assert_eq!(result.text, "w10 w11 w12");
        assert_eq!(ranges(&result), vec![(10, 13)]);
        assert!(result.sources[0].truncated);
    }

    #[test]
    fn test_cut_exactly_on_space_keeps_whole_words() {
        assert_eq!(truncate_at_word("three four five", 10), "three four");
        assert_eq!(truncate_at_word("three four five", 11), "three four");
        assert_eq!(truncate_at_word("three four five", 12), "three four");
        assert_eq!(truncate_at_word("three four five", 99), "three four five");
    }

    #[test]
    fn test_single_long_word_truncates_to_nothing() {
        assert_eq!(truncate_at_word("pneumonoultramicroscopic", 5), "");

        let ranked = vec![scored("a.txt", 0, "pneumonoultramicroscopic", 0.9)];
        let result = ContextAssembler::new(5).assemble(&ranked).unwrap();
        assert_eq!(result.text, "");
        assert!(result.is_empty());
    }

    #[test]
    fn test_budget_counts_characters_not_bytes() {
        let ranked = vec![scored("a.txt", 0, "função ação coração", 0.9)];
        let result = ContextAssembler::new(11).assemble(&ranked).unwrap();
        assert_eq!(result.text, "função ação");
        assert_eq!(result.char_len(), 11);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let words = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do";
        let ranked: Vec<_> = (0..6)
            .map(|i| scored("doc.txt", i, words, 1.0 - i as f64 * 0.1))
            .collect();

        for max_chars in 1..400 {
            let result = ContextAssembler::new(max_chars).assemble(&ranked).unwrap();
            assert!(
                result.char_len() <= max_chars,
                "{} chars for budget {}",
                result.char_len(),
                max_chars
            );
            assert!(!result.text.ends_with(' '));
        }
    }
}
