//! Word-window chunker.
//!
//! Splits a document into passages of `size_words` words, each starting
//! `size_words - overlap_words` words after the previous one. The last window
//! is clipped to the end of the document and may be shorter.

use tutor_core::config::ChunkingConfig;
use tutor_core::error::Result;
use tutor_core::types::Passage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size_words: usize,
    overlap_words: usize,
    step: usize,
}

impl Chunker {
    /// Create a chunker. Fails unless `0 < size_words` and
    /// `overlap_words < size_words`, since the window would otherwise never
    /// advance.
    pub fn new(size_words: usize, overlap_words: usize) -> Result<Self> {
        Self::from_config(&ChunkingConfig {
            size_words,
            overlap_words,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            size_words: config.size_words,
            overlap_words: config.overlap_words,
            step: config.step(),
        })
    }

    pub fn size_words(&self) -> usize {
        self.size_words
    }

    pub fn overlap_words(&self) -> usize {
        self.overlap_words
    }

    /// Split `text` into passages attributed to `source_id`.
    ///
    /// Returns an empty list for text with no words.
    pub fn chunk(&self, source_id: &str, text: &str) -> Vec<Passage> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let total = words.len();

        let mut passages = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + self.size_words).min(total);
            passages.push(Passage {
                source_id: source_id.to_string(),
                chunk_index: passages.len(),
                start_word: start,
                end_word: end,
                text: words[start..end].join(" "),
            });
            if start + self.size_words >= total {
                break;
            }
            start += self.step;
        }

        passages
    }
}
